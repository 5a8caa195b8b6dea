//! mTLS admission gate for agent traffic.
//!
//! Transport-agnostic: the embedding server hands over the request path and
//! the peer certificate (DER) it captured during the TLS handshake, and gets
//! back a decision. Enrollment and liveness endpoints are exempt because a
//! node has no certificate before it enrolls.

use std::sync::Arc;

use tracing::warn;

use warden_core::error::{DomainError, DomainResult};
use warden_pki::{CertificateValidator, ValidationError, VerifiedAgent};

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Disable client-certificate enforcement entirely (development only).
    pub enabled: bool,
    /// When false, requests without a certificate pass through anonymously
    /// instead of being rejected. Presented certificates are still validated.
    pub require_client_certificate: bool,
    /// Paths reachable without a client certificate. Enrollment and the CA
    /// trust-root download come before a node has any identity.
    pub exempt_paths: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            require_client_certificate: true,
            exempt_paths: vec![
                "/api/agent/enroll".to_string(),
                "/api/agent/ca-certificate".to_string(),
                "/healthz".to_string(),
            ],
        }
    }
}

/// Outcome of gating one request.
#[derive(Debug)]
pub enum GateDecision {
    /// Admitted without an identity: exempt path, gate disabled, or
    /// certificates optional and none presented.
    Exempt,
    /// Certificate missing or rejected; the caller answers 401.
    Unauthenticated { code: &'static str },
    /// A verified agent identity.
    Agent(VerifiedAgent),
}

pub struct MtlsGate {
    validator: Arc<CertificateValidator>,
    config: GateConfig,
}

impl MtlsGate {
    pub fn new(validator: Arc<CertificateValidator>, config: GateConfig) -> Self {
        Self { validator, config }
    }

    /// Gate one request. Validation rejections become `Unauthenticated`;
    /// infrastructure failures propagate so they surface as 5xx, not 401.
    pub async fn authorize(
        &self,
        path: &str,
        client_cert_der: Option<&[u8]>,
    ) -> DomainResult<GateDecision> {
        if !self.config.enabled {
            return Ok(GateDecision::Exempt);
        }
        if self.config.exempt_paths.iter().any(|p| p == path) {
            return Ok(GateDecision::Exempt);
        }

        let Some(der) = client_cert_der else {
            if !self.config.require_client_certificate {
                return Ok(GateDecision::Exempt);
            }
            warn!(path, "Request without client certificate rejected");
            return Ok(GateDecision::Unauthenticated {
                code: "client_certificate_required",
            });
        };

        match self.validator.validate_client_certificate(der).await {
            Ok(agent) => Ok(GateDecision::Agent(agent)),
            Err(ValidationError::Pki(e)) => Err(DomainError::Trust {
                code: "pki_failure",
                message: e.to_string(),
            }),
            Err(rejection) => Ok(GateDecision::Unauthenticated {
                code: rejection.code(),
            }),
        }
    }
}
