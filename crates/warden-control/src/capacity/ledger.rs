//! The reservation ledger.
//!
//! Placement capacity is handed out as short-lived reservations: a scheduler
//! reserves memory and disk on a node, then either claims the reservation for
//! a concrete server or lets it lapse. Admission control happens here, under
//! a per-node lock, so two racing reserves can never jointly over-subscribe a
//! node. Ledger rows are never deleted; terminal states keep the history.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use warden_core::db::unix_timestamp;
use warden_core::error::{DomainError, DomainResult};

use crate::api::AvailableCapacity;
use crate::events::{EventPublisher, FleetEvent};
use crate::storage::{
    CapacityReservation, ControlDatabase, NodeStatus, ReservationParams, ReservationStatus,
};

const BYTES_PER_MB: i64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct CapacityConfig {
    /// How long an unclaimed reservation holds capacity.
    pub reservation_ttl_seconds: i64,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            reservation_ttl_seconds: 300,
        }
    }
}

/// A scheduler's ask for capacity on a specific node.
#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub node_id: Uuid,
    pub memory_mb: i64,
    pub disk_mb: i64,
    pub cpu_millicores: i64,
    pub requested_by: String,
    /// Reservation lifetime in minutes; the configured default when `None`.
    pub ttl_minutes: Option<i64>,
}

pub struct CapacityLedger {
    db: ControlDatabase,
    events: Arc<dyn EventPublisher>,
    config: CapacityConfig,
    // Serializes the check-then-insert in reserve() per node. Claims and
    // releases rely on conditional updates instead and skip the lock.
    node_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CapacityLedger {
    pub fn new(
        db: ControlDatabase,
        events: Arc<dyn EventPublisher>,
        config: CapacityConfig,
    ) -> Self {
        Self {
            db,
            events,
            config,
            node_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn node_lock(&self, node_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.node_locks.lock().await;
        locks
            .entry(node_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Reserve memory and disk on a node.
    ///
    /// Admission checks run under the node's lock so concurrent reserves see
    /// each other's commitments. Offline and maintenance nodes take nothing.
    pub async fn reserve(&self, request: &ReserveRequest) -> DomainResult<CapacityReservation> {
        let id = request.node_id.to_string();
        let node = self
            .db
            .get_node(&id)
            .await?
            .ok_or(DomainError::NodeNotFound(request.node_id))?;

        match node.status() {
            NodeStatus::Decommissioned => {
                return Err(DomainError::NodeDecommissioned(request.node_id));
            }
            status @ (NodeStatus::Offline | NodeStatus::Maintenance) => {
                return Err(DomainError::NodeUnavailable {
                    node: request.node_id,
                    status: status.as_str().to_string(),
                });
            }
            // Degraded nodes still take work; the scheduler weighs health
            // separately.
            NodeStatus::Enrolling | NodeStatus::Online | NodeStatus::Degraded => {}
        }

        let lock = self.node_lock(&id).await;
        let _guard = lock.lock().await;

        let capacity = self
            .db
            .get_node_capacity(&id)
            .await?
            .ok_or(DomainError::NodeNotFound(request.node_id))?;
        let committed = self.db.active_commitments(&id).await?;

        let available_memory_mb =
            (capacity.available_memory_bytes / BYTES_PER_MB - committed.memory_mb).max(0);
        if request.memory_mb > available_memory_mb {
            return Err(DomainError::InsufficientMemory {
                requested_mb: request.memory_mb,
                available_mb: available_memory_mb,
            });
        }

        let available_disk_mb =
            (capacity.available_disk_bytes / BYTES_PER_MB - committed.disk_mb).max(0);
        if request.disk_mb > available_disk_mb {
            return Err(DomainError::InsufficientDisk {
                requested_mb: request.disk_mb,
                available_mb: available_disk_mb,
            });
        }

        let token = format!("rsv-{}", hex::encode(rand::random::<u128>().to_be_bytes()));
        let ttl_seconds = request
            .ttl_minutes
            .map_or(self.config.reservation_ttl_seconds, |minutes| minutes * 60);
        let expires_at = unix_timestamp() + ttl_seconds;
        let reservation = self
            .db
            .create_reservation(&ReservationParams {
                token: &token,
                node_id: &id,
                memory_mb: request.memory_mb,
                disk_mb: request.disk_mb,
                cpu_millicores: request.cpu_millicores,
                requested_by: &request.requested_by,
                expires_at,
            })
            .await?;

        info!(
            node_id = %request.node_id,
            %token,
            memory_mb = request.memory_mb,
            disk_mb = request.disk_mb,
            "Capacity reserved"
        );
        self.events.publish(FleetEvent::CapacityReserved {
            node_id: request.node_id,
            token: token.clone(),
            memory_mb: request.memory_mb,
            disk_mb: request.disk_mb,
        });

        Ok(reservation)
    }

    /// Bind a pending reservation to a concrete server. Exactly one caller
    /// can win; everyone else gets a precise error.
    pub async fn claim(&self, token: &str, server_id: &str) -> DomainResult<CapacityReservation> {
        if self.db.claim_reservation(token, server_id).await? {
            info!(token, server_id, "Reservation claimed");
            self.events.publish(FleetEvent::CapacityClaimed {
                token: token.to_string(),
                server_id: server_id.to_string(),
            });
            return self
                .db
                .get_reservation(token)
                .await?
                .ok_or_else(|| DomainError::ReservationNotFound(token.to_string()));
        }

        // The conditional update lost; re-read to say why.
        let reservation = self
            .db
            .get_reservation(token)
            .await?
            .ok_or_else(|| DomainError::ReservationNotFound(token.to_string()))?;
        match reservation.status() {
            ReservationStatus::Claimed => Err(DomainError::ReservationClaimed(token.to_string())),
            _ => Err(DomainError::ReservationExpired(token.to_string())),
        }
    }

    /// Give a pending reservation back. Releasing an already-released or
    /// expired reservation is a no-op; releasing a claimed one is an error
    /// because the capacity is in use.
    pub async fn release(&self, token: &str) -> DomainResult<()> {
        if self.db.release_reservation(token).await? {
            info!(token, "Reservation released");
            self.events.publish(FleetEvent::CapacityReleased {
                token: token.to_string(),
            });
            return Ok(());
        }

        let reservation = self
            .db
            .get_reservation(token)
            .await?
            .ok_or_else(|| DomainError::ReservationNotFound(token.to_string()))?;
        match reservation.status() {
            ReservationStatus::Claimed => Err(DomainError::ReservationClaimed(token.to_string())),
            ReservationStatus::Released | ReservationStatus::Expired => Ok(()),
            // Pending but past expiry; the sweep will get it.
            ReservationStatus::Pending => Ok(()),
        }
    }

    /// Expire every pending reservation past its deadline. Returns how many
    /// were expired.
    pub async fn expire_stale(&self) -> DomainResult<usize> {
        let expired = self.db.expire_stale_reservations().await?;
        for reservation in &expired {
            debug!(token = %reservation.token, node_id = %reservation.node_id, "Reservation expired");
            let node_id = Uuid::parse_str(&reservation.node_id).unwrap_or_default();
            self.events.publish(FleetEvent::ReservationExpired {
                node_id,
                token: reservation.token.clone(),
            });
        }
        Ok(expired.len())
    }

    /// Active (`Pending` non-expired + `Claimed`) reservations for a node.
    pub async fn active_reservations(
        &self,
        node_id: Uuid,
    ) -> DomainResult<Vec<CapacityReservation>> {
        let id = node_id.to_string();
        self.db
            .get_node(&id)
            .await?
            .ok_or(DomainError::NodeNotFound(node_id))?;
        Ok(self.db.list_active_reservations(&id).await?)
    }

    /// Read-only capacity projection: reported spare capacity minus active
    /// commitments.
    pub async fn available_capacity(&self, node_id: Uuid) -> DomainResult<AvailableCapacity> {
        let id = node_id.to_string();
        self.db
            .get_node(&id)
            .await?
            .ok_or(DomainError::NodeNotFound(node_id))?;
        let capacity = self
            .db
            .get_node_capacity(&id)
            .await?
            .ok_or(DomainError::NodeNotFound(node_id))?;
        let committed = self.db.active_commitments(&id).await?;

        let available_memory_mb = capacity.available_memory_bytes / BYTES_PER_MB;
        let available_disk_mb = capacity.available_disk_bytes / BYTES_PER_MB;
        Ok(AvailableCapacity {
            node_id,
            available_memory_mb,
            available_disk_mb,
            reserved_memory_mb: committed.memory_mb,
            reserved_disk_mb: committed.disk_mb,
            effective_memory_mb: (available_memory_mb - committed.memory_mb).max(0),
            effective_disk_mb: (available_disk_mb - committed.disk_mb).max(0),
            active_reservations: committed.count,
        })
    }
}
