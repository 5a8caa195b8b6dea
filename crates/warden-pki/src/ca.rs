//! Certificate authority for node identity.
//!
//! The CA owns one long-lived key pair and signs short-lived client
//! certificates for enrolled nodes. Key material is persisted through a
//! [`CaStore`] so every process start can call [`CertificateAuthority::initialize`]
//! safely: the first initializer generates and persists the CA, later ones
//! reload it.
//!
//! Issued certificates carry the node id as Common Name, the `ClientAuth`
//! extended key usage, and a `spiffe://<trust-domain>/nodes/<node-id>` URI
//! SAN. The SHA-256 thumbprint of the DER encoding is the revocation key.

use std::sync::{Arc, RwLock};

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, SanType, SerialNumber,
    string::Ia5String,
};
use sha2::{Digest, Sha256};
use ::time;
use tracing::info;
use uuid::Uuid;
use x509_parser::prelude::*;

use crate::error::PkiError;
use crate::spiffe::SpiffeId;
use crate::store::{CaMaterial, CaStore, SaveOutcome};

/// CA configuration.
#[derive(Debug, Clone)]
pub struct CaConfig {
    /// Name distinguishing this deployment in the CA subject.
    pub deployment_name: String,
    /// SPIFFE trust domain embedded in issued certificates.
    pub trust_domain: String,
    /// Self-signed CA certificate validity in years.
    pub ca_validity_years: i64,
    /// Client certificate validity in days.
    pub certificate_validity_days: i64,
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            deployment_name: "Warden".to_string(),
            trust_domain: "warden.local".to_string(),
            ca_validity_years: 10,
            certificate_validity_days: 30,
        }
    }
}

/// Revocation lookup against the persistence layer.
///
/// Implemented by the control-plane storage over its certificate table.
#[async_trait::async_trait]
pub trait RevocationLookup: Send + Sync {
    /// Whether the certificate with this thumbprint has been revoked.
    ///
    /// Unknown thumbprints are not revoked; chain validation catches
    /// certificates this CA never issued.
    async fn is_revoked(&self, thumbprint: &str) -> Result<bool, PkiError>;
}

/// A freshly issued client certificate with its transport bundle.
#[derive(Debug)]
pub struct IssuedCertificate {
    /// PEM-encoded client certificate.
    pub cert_pem: String,
    /// PEM-encoded private key, delivered to the node exactly once.
    pub key_pem: String,
    /// Hex SHA-256 of the certificate DER; the revocation key.
    pub thumbprint: String,
    /// Hex-encoded random 128-bit serial number.
    pub serial_number: String,
    /// Validity window as unix timestamps.
    pub not_before: i64,
    pub not_after: i64,
}

struct CaState {
    key_pem: String,
    cert_pem: String,
    cert_der: Vec<u8>,
}

/// The deployment's private certificate authority.
pub struct CertificateAuthority {
    config: CaConfig,
    store: Arc<dyn CaStore>,
    revocation: Arc<dyn RevocationLookup>,
    state: RwLock<Option<CaState>>,
}

/// Hex SHA-256 thumbprint of a DER-encoded certificate.
pub fn thumbprint(der: &[u8]) -> String {
    hex::encode(Sha256::digest(der))
}

/// Decode the first PEM block of a certificate into DER bytes.
pub fn pem_to_der(pem: &str) -> Result<Vec<u8>, PkiError> {
    let (_, parsed) = x509_parser::pem::parse_x509_pem(pem.as_bytes())
        .map_err(|e| PkiError::Parse(format!("invalid PEM: {e}")))?;
    Ok(parsed.contents)
}

impl CertificateAuthority {
    pub fn new(
        config: CaConfig,
        store: Arc<dyn CaStore>,
        revocation: Arc<dyn RevocationLookup>,
    ) -> Self {
        Self {
            config,
            store,
            revocation,
            state: RwLock::new(None),
        }
    }

    /// Load or create the CA key material. Idempotent.
    ///
    /// Concurrent initializers converge on a single CA: whoever persists
    /// first wins, everyone else reloads the winner's material.
    pub fn initialize(&self) -> Result<(), PkiError> {
        {
            let guard = self
                .state
                .read()
                .map_err(|_| PkiError::Store("CA state lock poisoned".into()))?;
            if guard.is_some() {
                return Ok(());
            }
        }

        let material = match self.store.load()? {
            Some(material) => material,
            None => {
                let generated = self.generate_material()?;
                match self.store.save(&generated)? {
                    SaveOutcome::Saved => {
                        info!(
                            deployment = %self.config.deployment_name,
                            "Generated new CA key material"
                        );
                        generated
                    }
                    SaveOutcome::AlreadyExists => self
                        .store
                        .load()?
                        .ok_or_else(|| PkiError::Store("CA material vanished after save race".into()))?,
                }
            }
        };

        let cert_der = pem_to_der(&material.cert_pem)?;
        let mut guard = self
            .state
            .write()
            .map_err(|_| PkiError::Store("CA state lock poisoned".into()))?;
        *guard = Some(CaState {
            key_pem: material.key_pem,
            cert_pem: material.cert_pem,
            cert_der,
        });
        Ok(())
    }

    fn generate_material(&self) -> Result<CaMaterial, PkiError> {
        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(format!("{} Node CA", self.config.deployment_name)),
        );
        dn.push(
            DnType::OrganizationName,
            DnValue::Utf8String(self.config.deployment_name.clone()),
        );
        params.distinguished_name = dn;

        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let now = time::OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + time::Duration::days(self.config.ca_validity_years * 365);

        let key_pair =
            KeyPair::generate().map_err(|e| PkiError::Generation(format!("CA key: {e}")))?;
        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| PkiError::Generation(format!("CA cert: {e}")))?;

        Ok(CaMaterial {
            key_pem: key_pair.serialize_pem(),
            cert_pem: cert.pem(),
        })
    }

    fn with_state<T>(&self, f: impl FnOnce(&CaState) -> Result<T, PkiError>) -> Result<T, PkiError> {
        let guard = self
            .state
            .read()
            .map_err(|_| PkiError::Store("CA state lock poisoned".into()))?;
        let state = guard.as_ref().ok_or(PkiError::CaNotInitialized)?;
        f(state)
    }

    /// The CA's public certificate (PEM), the trust root agents download.
    pub fn ca_cert_pem(&self) -> Result<String, PkiError> {
        self.with_state(|s| Ok(s.cert_pem.clone()))
    }

    /// The configured trust domain.
    pub fn trust_domain(&self) -> &str {
        &self.config.trust_domain
    }

    /// Issue a fresh client certificate for a node.
    ///
    /// Generates a new key pair per call; the private key is returned to the
    /// caller for one-time transport to the node and never persisted.
    pub fn issue_certificate(&self, node_id: Uuid) -> Result<IssuedCertificate, PkiError> {
        self.with_state(|state| {
            let spiffe = SpiffeId::new(self.config.trust_domain.clone(), node_id);

            let mut params = CertificateParams::default();

            let mut dn = DistinguishedName::new();
            dn.push(DnType::CommonName, DnValue::Utf8String(node_id.to_string()));
            dn.push(
                DnType::OrganizationName,
                DnValue::Utf8String(self.config.deployment_name.clone()),
            );
            params.distinguished_name = dn;

            params.is_ca = IsCa::NoCa;
            params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
            params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];

            params.subject_alt_names = vec![SanType::URI(
                Ia5String::try_from(spiffe.uri())
                    .map_err(|e| PkiError::Generation(format!("SPIFFE URI: {e}")))?,
            )];

            let now = time::OffsetDateTime::now_utc();
            params.not_before = now;
            params.not_after =
                now + time::Duration::days(self.config.certificate_validity_days);

            // 128-bit random serial; collision odds are negligible.
            let serial = rand::random::<u128>().to_be_bytes();
            params.serial_number = Some(SerialNumber::from(serial.to_vec()));

            let client_key = KeyPair::generate()
                .map_err(|e| PkiError::Generation(format!("client key: {e}")))?;

            let ca_key = KeyPair::from_pem(&state.key_pem)
                .map_err(|e| PkiError::Parse(format!("CA key: {e}")))?;
            let issuer = Issuer::from_ca_cert_pem(&state.cert_pem, &ca_key)
                .map_err(|e| PkiError::Parse(format!("CA cert: {e}")))?;

            let cert = params
                .signed_by(&client_key, &issuer)
                .map_err(|e| PkiError::Generation(format!("sign client cert: {e}")))?;

            let der = cert.der().as_ref().to_vec();

            Ok(IssuedCertificate {
                cert_pem: cert.pem(),
                key_pem: client_key.serialize_pem(),
                thumbprint: thumbprint(&der),
                serial_number: hex::encode(serial),
                not_before: now.unix_timestamp(),
                not_after: (now
                    + time::Duration::days(self.config.certificate_validity_days))
                .unix_timestamp(),
            })
        })
    }

    /// Re-issue with a fresh key pair, thumbprint, and serial.
    ///
    /// Does not revoke the predecessor; revocation is a separate explicit
    /// action (policy decision, see DESIGN.md).
    pub fn renew_certificate(&self, node_id: Uuid) -> Result<IssuedCertificate, PkiError> {
        self.issue_certificate(node_id)
    }

    /// Verify that a PEM certificate was signed by this CA's key.
    ///
    /// Pure chain check; does not consult revocation state.
    pub fn verify_issuer(&self, cert_pem: &str) -> Result<bool, PkiError> {
        let der = match pem_to_der(cert_pem) {
            Ok(der) => der,
            Err(_) => return Ok(false),
        };
        self.verify_issuer_der(&der)
    }

    /// DER variant of [`Self::verify_issuer`].
    pub fn verify_issuer_der(&self, der: &[u8]) -> Result<bool, PkiError> {
        self.with_state(|state| {
            let Ok((_, cert)) = X509Certificate::from_der(der) else {
                return Ok(false);
            };
            let Ok((_, ca_cert)) = X509Certificate::from_der(&state.cert_der) else {
                return Err(PkiError::Parse("stored CA certificate is invalid".into()));
            };
            Ok(cert.verify_signature(Some(ca_cert.public_key())).is_ok())
        })
    }

    /// True iff the certificate chains to this CA and its thumbprint is not
    /// revoked. A self-signed or foreign certificate always fails.
    pub async fn validate_certificate(&self, cert_pem: &str) -> Result<bool, PkiError> {
        let der = match pem_to_der(cert_pem) {
            Ok(der) => der,
            Err(_) => return Ok(false),
        };
        self.validate_certificate_der(&der).await
    }

    /// DER variant of [`Self::validate_certificate`].
    pub async fn validate_certificate_der(&self, der: &[u8]) -> Result<bool, PkiError> {
        if !self.verify_issuer_der(der)? {
            return Ok(false);
        }
        let revoked = self.revocation.is_revoked(&thumbprint(der)).await?;
        Ok(!revoked)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::store::MemoryCaStore;

    /// Revocation lookup over an in-memory set.
    #[derive(Default)]
    pub(crate) struct FakeRevocations {
        revoked: Mutex<Vec<String>>,
    }

    impl FakeRevocations {
        pub(crate) fn revoke(&self, thumbprint: &str) {
            self.revoked.lock().unwrap().push(thumbprint.to_string());
        }
    }

    #[async_trait::async_trait]
    impl RevocationLookup for FakeRevocations {
        async fn is_revoked(&self, thumbprint: &str) -> Result<bool, PkiError> {
            Ok(self
                .revoked
                .lock()
                .unwrap()
                .iter()
                .any(|t| t == thumbprint))
        }
    }

    fn test_ca() -> (CertificateAuthority, Arc<FakeRevocations>) {
        let revocations = Arc::new(FakeRevocations::default());
        let ca = CertificateAuthority::new(
            CaConfig {
                deployment_name: "Warden Test".into(),
                trust_domain: "fleet.test".into(),
                ca_validity_years: 1,
                certificate_validity_days: 7,
            },
            Arc::new(MemoryCaStore::new()),
            Arc::clone(&revocations) as Arc<dyn RevocationLookup>,
        );
        ca.initialize().unwrap();
        (ca, revocations)
    }

    #[test]
    fn initialize_is_idempotent() {
        let (ca, _) = test_ca();
        let first = ca.ca_cert_pem().unwrap();
        ca.initialize().unwrap();
        assert_eq!(ca.ca_cert_pem().unwrap(), first);
    }

    #[test]
    fn initialize_reloads_persisted_material() {
        let store = Arc::new(MemoryCaStore::new());
        let revocations = Arc::new(FakeRevocations::default());

        let ca1 = CertificateAuthority::new(
            CaConfig::default(),
            Arc::clone(&store) as Arc<dyn CaStore>,
            Arc::clone(&revocations) as Arc<dyn RevocationLookup>,
        );
        ca1.initialize().unwrap();

        let ca2 = CertificateAuthority::new(
            CaConfig::default(),
            store as Arc<dyn CaStore>,
            revocations as Arc<dyn RevocationLookup>,
        );
        ca2.initialize().unwrap();

        assert_eq!(ca1.ca_cert_pem().unwrap(), ca2.ca_cert_pem().unwrap());
    }

    #[test]
    fn uninitialized_ca_fails_closed() {
        let ca = CertificateAuthority::new(
            CaConfig::default(),
            Arc::new(MemoryCaStore::new()),
            Arc::new(FakeRevocations::default()),
        );
        assert!(matches!(
            ca.issue_certificate(Uuid::new_v4()),
            Err(PkiError::CaNotInitialized)
        ));
        assert!(matches!(ca.ca_cert_pem(), Err(PkiError::CaNotInitialized)));
    }

    #[test]
    fn issued_certificate_has_identity_fields() {
        let (ca, _) = test_ca();
        let node = Uuid::new_v4();
        let issued = ca.issue_certificate(node).unwrap();

        assert!(issued.cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(issued.key_pem.contains("BEGIN PRIVATE KEY"));
        assert_eq!(issued.thumbprint.len(), 64);
        assert_eq!(issued.serial_number.len(), 32);
        assert!(issued.not_after > issued.not_before);

        let der = pem_to_der(&issued.cert_pem).unwrap();
        let (_, cert) = X509Certificate::from_der(&der).unwrap();
        let cn = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|c| c.as_str().ok())
            .unwrap();
        assert_eq!(cn, node.to_string());
    }

    #[tokio::test]
    async fn issued_certificate_validates_until_revoked() {
        let (ca, revocations) = test_ca();
        let issued = ca.issue_certificate(Uuid::new_v4()).unwrap();

        assert!(ca.validate_certificate(&issued.cert_pem).await.unwrap());

        revocations.revoke(&issued.thumbprint);
        assert!(!ca.validate_certificate(&issued.cert_pem).await.unwrap());
    }

    #[tokio::test]
    async fn foreign_certificate_never_validates() {
        let (ca, _) = test_ca();
        let (other, _) = test_ca();
        let foreign = other.issue_certificate(Uuid::new_v4()).unwrap();

        assert!(!ca.validate_certificate(&foreign.cert_pem).await.unwrap());
        // The foreign CA's own self-signed cert fails too.
        let other_root = other.ca_cert_pem().unwrap();
        assert!(!ca.validate_certificate(&other_root).await.unwrap());
    }

    #[test]
    fn renewal_produces_fresh_key_and_thumbprint() {
        let (ca, _) = test_ca();
        let node = Uuid::new_v4();
        let first = ca.issue_certificate(node).unwrap();
        let renewed = ca.renew_certificate(node).unwrap();

        assert_ne!(first.thumbprint, renewed.thumbprint);
        assert_ne!(first.serial_number, renewed.serial_number);
        assert_ne!(first.key_pem, renewed.key_pem);
    }
}
