//! Domain error taxonomy for the fleet core.
//!
//! Every rejection a caller can act on carries a stable machine-readable
//! code via [`DomainError::code`]. Codes are part of the external contract
//! and must not change between releases.

use uuid::Uuid;

use crate::db::DatabaseError;

/// Result alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Errors surfaced by enrollment, capacity, heartbeat, and lifecycle
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    // --- validation ---
    #[error("Enrollment token is invalid, expired, revoked, or already used")]
    InvalidToken,

    #[error("Unsupported platform: {0}")]
    InvalidPlatform(String),

    // --- not found ---
    #[error("Node {0} not found")]
    NodeNotFound(Uuid),

    #[error("Reservation {0} not found")]
    ReservationNotFound(String),

    // --- state conflicts ---
    #[error("Node {0} is decommissioned")]
    NodeDecommissioned(Uuid),

    #[error("Node {node} is {status} and cannot accept reservations")]
    NodeUnavailable { node: Uuid, status: String },

    #[error("Reservation {0} has expired")]
    ReservationExpired(String),

    #[error("Reservation {0} is already claimed")]
    ReservationClaimed(String),

    #[error("Node {0} is already in maintenance")]
    AlreadyInMaintenance(Uuid),

    #[error("Node {0} is not in maintenance")]
    NotInMaintenance(Uuid),

    // --- resource exhaustion ---
    #[error("Insufficient memory: requested {requested_mb} MB, {available_mb} MB available")]
    InsufficientMemory { requested_mb: i64, available_mb: i64 },

    #[error("Insufficient disk: requested {requested_mb} MB, {available_mb} MB available")]
    InsufficientDisk { requested_mb: i64, available_mb: i64 },

    // --- trust failures (propagated from the PKI layer) ---
    #[error("Certificate operation failed: {code}: {message}")]
    Trust { code: &'static str, message: String },

    // --- infrastructure ---
    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

impl DomainError {
    /// Stable machine-readable code for this error.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidToken => "invalid_token",
            Self::InvalidPlatform(_) => "invalid_platform",
            Self::NodeNotFound(_) => "node_not_found",
            Self::ReservationNotFound(_) => "reservation_not_found",
            Self::NodeDecommissioned(_) => "node_decommissioned",
            Self::NodeUnavailable { .. } => "node_unavailable",
            Self::ReservationExpired(_) => "reservation_expired",
            Self::ReservationClaimed(_) => "reservation_claimed",
            Self::AlreadyInMaintenance(_) => "already_in_maintenance",
            Self::NotInMaintenance(_) => "not_in_maintenance",
            Self::InsufficientMemory { .. } => "insufficient_memory",
            Self::InsufficientDisk { .. } => "insufficient_disk",
            Self::Trust { code, .. } => code,
            Self::Storage(_) => "storage_failure",
        }
    }

    /// Whether this is a retryable infrastructure failure rather than a
    /// domain-level rejection.
    pub const fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
