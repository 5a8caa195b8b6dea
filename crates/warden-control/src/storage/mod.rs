//! SQLite storage for the Warden control plane.
//!
//! Provides persistence for nodes, hardware inventory, capacity and
//! reservations, agent certificates, enrollment tokens, and node health.
//!
//! Soft-delete discipline: every read path excludes soft-deleted nodes;
//! administrative flows that need them use the explicit
//! `*_including_deleted` queries.

mod db;
mod models;
mod queries_capacity;
mod queries_certs;
mod queries_health;
mod queries_nodes;
mod queries_tokens;

#[cfg(test)]
mod tests;

pub use db::ControlDatabase;
pub use models::*;
pub use queries_capacity::{ActiveCommitments, ReservationParams};
pub use queries_certs::CertificateParams;
pub use queries_health::HealthParams;
pub use queries_nodes::EnrollmentRecord;
pub use warden_core::db::DatabaseError;
