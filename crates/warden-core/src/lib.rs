//! Warden Core Library
//!
//! Shared functionality for Warden components:
//! - SQLite pool helpers and timestamp utilities
//! - Domain error taxonomy with stable machine-readable codes
//! - Tracing/logging initialization

pub mod db;
pub mod error;
pub mod tracing_init;

pub use error::{DomainError, DomainResult};
