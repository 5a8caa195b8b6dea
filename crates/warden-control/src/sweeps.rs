//! Background sweeps.
//!
//! Two periodic loops keep the fleet honest: one marks silent nodes offline,
//! one expires lapsed reservations. A failed tick is logged and the loop
//! carries on; sweeps must survive transient storage trouble.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::capacity::CapacityLedger;
use crate::health::HeartbeatService;

#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub stale_node_interval: Duration,
    pub reservation_expiry_interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            stale_node_interval: Duration::from_secs(60),
            reservation_expiry_interval: Duration::from_secs(30),
        }
    }
}

/// Spawn both sweep loops. The handles run until aborted or the runtime
/// shuts down.
pub fn spawn_sweeps(
    heartbeat: Arc<HeartbeatService>,
    ledger: Arc<CapacityLedger>,
    config: &SweepConfig,
) -> (JoinHandle<()>, JoinHandle<()>) {
    let stale_interval = config.stale_node_interval;
    let stale = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(stale_interval);
        loop {
            ticker.tick().await;
            match heartbeat.check_stale_nodes().await {
                Ok(0) => {}
                Ok(count) => debug!(count, "Stale-node sweep transitioned nodes offline"),
                Err(e) => warn!(error = %e, "Stale-node sweep failed"),
            }
        }
    });

    let expiry_interval = config.reservation_expiry_interval;
    let expiry = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(expiry_interval);
        loop {
            ticker.tick().await;
            match ledger.expire_stale().await {
                Ok(0) => {}
                Ok(count) => debug!(count, "Reservation sweep expired reservations"),
                Err(e) => warn!(error = %e, "Reservation sweep failed"),
            }
        }
    });

    (stale, expiry)
}
