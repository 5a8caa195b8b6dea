//! Warden Control Plane Library
//!
//! Fleet trust and capacity core for game-server hosting:
//! - SQLite storage for nodes, tokens, certificates, reservations, health
//! - Token-gated enrollment issuing SPIFFE client certificates
//! - Over-subscription-safe capacity reservation ledger
//! - Heartbeat scoring pipeline and node-status state machine
//! - mTLS admission gate for agent traffic

pub mod api;
pub mod audit;
pub mod capacity;
pub mod enrollment;
pub mod events;
pub mod gate;
pub mod health;
pub mod lifecycle;
pub mod storage;
pub mod sweeps;
