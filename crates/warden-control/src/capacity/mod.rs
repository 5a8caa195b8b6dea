//! Over-subscription-safe capacity reservations.

pub mod ledger;


pub use ledger::{CapacityConfig, CapacityLedger, ReserveRequest};
