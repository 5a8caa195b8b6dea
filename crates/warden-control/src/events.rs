//! Domain events published to the message bus.
//!
//! The core fires events and forgets them; delivery, fan-out, and consumer
//! failures are the bus's problem. The in-process implementation is a tokio
//! broadcast channel so co-located consumers (and tests) can subscribe.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Everything the fleet core announces to the outside world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FleetEvent {
    NodeEnrolled {
        node_id: Uuid,
        org_id: String,
        name: String,
    },
    NodeOnline {
        node_id: Uuid,
    },
    NodeDegraded {
        node_id: Uuid,
        issues: Vec<String>,
    },
    NodeRecovered {
        node_id: Uuid,
    },
    NodeOffline {
        node_id: Uuid,
        reason: String,
    },
    NodeDecommissioned {
        node_id: Uuid,
    },
    MaintenanceStarted {
        node_id: Uuid,
    },
    MaintenanceEnded {
        node_id: Uuid,
    },
    CapacityReserved {
        node_id: Uuid,
        token: String,
        memory_mb: i64,
        disk_mb: i64,
    },
    CapacityClaimed {
        token: String,
        server_id: String,
    },
    CapacityReleased {
        token: String,
    },
    ReservationExpired {
        node_id: Uuid,
        token: String,
    },
}

/// Fire-and-forget event publication.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: FleetEvent);
}

/// Broadcast-channel publisher. Send failures (no subscribers) are normal
/// and ignored.
pub struct BusPublisher {
    tx: broadcast::Sender<FleetEvent>,
}

impl BusPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.tx.subscribe()
    }
}

impl EventPublisher for BusPublisher {
    fn publish(&self, event: FleetEvent) {
        debug!(?event, "Publishing fleet event");
        let _ = self.tx.send(event);
    }
}

/// Publisher that drops everything (tests, tooling).
#[derive(Default)]
pub struct NullPublisher;

impl EventPublisher for NullPublisher {
    fn publish(&self, _event: FleetEvent) {}
}
