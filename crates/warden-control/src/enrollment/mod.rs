//! Token-gated node enrollment.

pub mod service;
pub mod tokens;

#[cfg(test)]
mod service_tests;

pub use service::{EnrollmentConfig, EnrollmentService};
pub use tokens::{IssuedToken, TokenIssuer, hash_token};
