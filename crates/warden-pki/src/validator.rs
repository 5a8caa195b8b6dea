//! Client certificate validation pipeline.
//!
//! Runs a fixed sequence of checks over an inbound client certificate and
//! short-circuits on the first failure. Each step maps to one
//! [`ValidationError`] variant with a stable code:
//!
//! 1. validity window (not yet valid / expired)
//! 2. issuer and revocation (delegates to the CA)
//! 3. `ClientAuth` extended key usage
//! 4. SPIFFE URI presence in the SAN
//! 5. trust-domain match
//! 6. node id parse from the `/nodes/<uuid>` path
//!
//! A malformed node id is treated the same as a missing SPIFFE id.

use std::sync::Arc;

use tracing::warn;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::*;

use crate::ca::{self, CertificateAuthority};
use crate::error::ValidationError;
use crate::spiffe::SpiffeId;

/// Validator tunables.
#[derive(Debug, Clone, Default)]
pub struct ValidatorConfig {
    /// Accept expired certificates. Non-production escape hatch only;
    /// every other check still applies.
    pub allow_expired_certificates: bool,
}

/// The identity extracted from a successfully validated certificate.
#[derive(Debug, Clone)]
pub struct VerifiedAgent {
    pub node_id: uuid::Uuid,
    pub spiffe_id: SpiffeId,
    /// Hex SHA-256 of the certificate DER.
    pub thumbprint: String,
    /// Certificate expiry as a unix timestamp.
    pub expires_at: i64,
}

/// Stateless validation pipeline over the CA's trust root.
pub struct CertificateValidator {
    ca: Arc<CertificateAuthority>,
    config: ValidatorConfig,
}

impl CertificateValidator {
    pub fn new(ca: Arc<CertificateAuthority>, config: ValidatorConfig) -> Self {
        Self { ca, config }
    }

    /// Validate a DER-encoded client certificate.
    pub async fn validate_client_certificate(
        &self,
        der: &[u8],
    ) -> Result<VerifiedAgent, ValidationError> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;

        let now = warden_now();
        let not_before = cert.validity().not_before.timestamp();
        let not_after = cert.validity().not_after.timestamp();

        if not_before > now {
            return Err(self.reject(ValidationError::NotYetValid));
        }
        if not_after < now && !self.config.allow_expired_certificates {
            return Err(self.reject(ValidationError::Expired));
        }

        if !self.ca.validate_certificate_der(der).await? {
            return Err(self.reject(ValidationError::InvalidIssuer));
        }

        let has_client_auth = cert
            .extended_key_usage()
            .ok()
            .flatten()
            .is_some_and(|ext| ext.value.client_auth);
        if !has_client_auth {
            return Err(self.reject(ValidationError::MissingClientAuthEku));
        }

        let Some(uri) = spiffe_uri(&cert) else {
            return Err(self.reject(ValidationError::MissingSpiffeId));
        };

        // Trust-domain check precedes node-id parsing so a foreign domain is
        // reported as a mismatch even when the rest of the URI is garbage.
        let authority = uri
            .strip_prefix("spiffe://")
            .and_then(|rest| rest.split('/').next())
            .unwrap_or_default();
        if authority != self.ca.trust_domain() {
            return Err(self.reject(ValidationError::TrustDomainMismatch));
        }

        let Some(spiffe_id) = SpiffeId::parse(&uri) else {
            return Err(self.reject(ValidationError::MissingSpiffeId));
        };

        Ok(VerifiedAgent {
            node_id: spiffe_id.node_id,
            thumbprint: ca::thumbprint(der),
            expires_at: not_after,
            spiffe_id,
        })
    }

    /// PEM convenience wrapper around [`Self::validate_client_certificate`].
    pub async fn validate_client_certificate_pem(
        &self,
        pem: &str,
    ) -> Result<VerifiedAgent, ValidationError> {
        let der =
            ca::pem_to_der(pem).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        self.validate_client_certificate(&der).await
    }

    fn reject(&self, err: ValidationError) -> ValidationError {
        // Trust failures are security-relevant; always leave a trace.
        warn!(code = err.code(), "Client certificate rejected");
        err
    }
}

#[allow(clippy::cast_possible_wrap)]
fn warden_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn spiffe_uri(cert: &X509Certificate<'_>) -> Option<String> {
    let san = cert.subject_alternative_name().ok().flatten()?;
    san.value.general_names.iter().find_map(|name| match name {
        GeneralName::URI(uri) if uri.starts_with("spiffe://") => Some((*uri).to_string()),
        _ => None,
    })
}
