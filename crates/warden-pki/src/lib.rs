//! Warden PKI
//!
//! Private certificate authority for node identity:
//! - CA key-material storage (file-backed or in-memory)
//! - Client certificate issuance with SPIFFE URI SANs
//! - Ordered validation pipeline for inbound client certificates
//!
//! The CA signs short-lived client certificates whose SAN carries a
//! `spiffe://<trust-domain>/nodes/<node-id>` workload identity. Revocation
//! state lives in the control-plane database and is consulted through the
//! [`RevocationLookup`] seam.

pub mod ca;
pub mod error;
pub mod spiffe;
pub mod store;
pub mod validator;

pub use ca::{CaConfig, CertificateAuthority, IssuedCertificate, RevocationLookup};
pub use error::{PkiError, ValidationError};
pub use spiffe::SpiffeId;
pub use store::{CaMaterial, CaStore, FileCaStore, MemoryCaStore, SaveOutcome};
pub use validator::{CertificateValidator, ValidatorConfig, VerifiedAgent};
