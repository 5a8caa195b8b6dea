//! PKI error types.

/// Errors from CA initialization, issuance, and key-material storage.
#[derive(Debug, thiserror::Error)]
pub enum PkiError {
    /// The CA has not been initialized; issuance and validation fail closed.
    #[error("CA not initialized")]
    CaNotInitialized,

    #[error("Certificate generation error: {0}")]
    Generation(String),

    #[error("Certificate parse error: {0}")]
    Parse(String),

    #[error("CA key store error: {0}")]
    Store(String),

    /// Revocation lookup against the persistence layer failed.
    #[error("Revocation lookup error: {0}")]
    RevocationLookup(String),
}

/// Certificate validation rejections, one per pipeline step.
///
/// Each variant maps to a stable code reported to the caller and logged as
/// security-relevant. Validation always fails closed.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Certificate is not yet valid")]
    NotYetValid,

    #[error("Certificate has expired")]
    Expired,

    #[error("Certificate was not issued by this CA or has been revoked")]
    InvalidIssuer,

    #[error("Certificate is missing the Client-Auth extended key usage")]
    MissingClientAuthEku,

    #[error("Certificate has no SPIFFE URI in its SAN")]
    MissingSpiffeId,

    #[error("SPIFFE trust domain does not match this deployment")]
    TrustDomainMismatch,

    #[error("Certificate could not be parsed: {0}")]
    Malformed(String),

    /// Infrastructure failure during validation (e.g. revocation lookup).
    #[error(transparent)]
    Pki(#[from] PkiError),
}

impl ValidationError {
    /// Stable machine-readable code for this rejection.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotYetValid => "certificate_not_yet_valid",
            Self::Expired => "certificate_expired",
            Self::InvalidIssuer => "invalid_issuer",
            Self::MissingClientAuthEku => "missing_client_auth_eku",
            Self::MissingSpiffeId => "missing_spiffe_id",
            Self::TrustDomainMismatch => "trust_domain_mismatch",
            Self::Malformed(_) => "malformed_certificate",
            Self::Pki(_) => "pki_failure",
        }
    }
}
