//! Operator-driven node lifecycle: maintenance, rename, decommission.
//!
//! These transitions are explicit and sticky. A node in maintenance keeps
//! heartbeating and recording health but its status never moves until the
//! operator ends the window; decommissioning is terminal and revokes every
//! live certificate the node holds.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use warden_core::error::{DomainError, DomainResult};

use warden_core::db::unix_timestamp;

use crate::audit::{AuditOutcome, AuditSink};
use crate::events::{EventPublisher, FleetEvent};
use crate::storage::{ControlDatabase, Node, NodeStatus};

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Heartbeat recency window used when a node leaves maintenance.
    pub stale_threshold_minutes: i64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            stale_threshold_minutes: 5,
        }
    }
}

pub struct LifecycleService {
    db: ControlDatabase,
    events: Arc<dyn EventPublisher>,
    audit: Arc<dyn AuditSink>,
    config: LifecycleConfig,
}

impl LifecycleService {
    pub fn new(
        db: ControlDatabase,
        events: Arc<dyn EventPublisher>,
        audit: Arc<dyn AuditSink>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            db,
            events,
            audit,
            config,
        }
    }

    async fn live_node(&self, node_id: Uuid) -> DomainResult<Node> {
        self.db
            .get_node(&node_id.to_string())
            .await?
            .ok_or(DomainError::NodeNotFound(node_id))
    }

    /// Put a node into maintenance. Heartbeats keep flowing but no status
    /// transition or reservation happens until the window ends.
    pub async fn enter_maintenance(&self, node_id: Uuid) -> DomainResult<()> {
        let node = self.live_node(node_id).await?;
        match node.status() {
            NodeStatus::Maintenance => return Err(DomainError::AlreadyInMaintenance(node_id)),
            NodeStatus::Decommissioned => return Err(DomainError::NodeDecommissioned(node_id)),
            _ => {}
        }

        self.db
            .update_node_status(&node_id.to_string(), NodeStatus::Maintenance)
            .await?;
        info!(%node_id, "Node entered maintenance");
        self.events.publish(FleetEvent::MaintenanceStarted { node_id });
        self.audit
            .log(
                "node.maintenance.start",
                "node",
                &node_id.to_string(),
                AuditOutcome::Success,
                None,
            )
            .await;
        Ok(())
    }

    /// End a maintenance window. The restored status comes from heartbeat
    /// recency, not from an assumption of health: a node that kept
    /// heartbeating through the window is `Online`, a silent one `Offline`.
    pub async fn exit_maintenance(&self, node_id: Uuid) -> DomainResult<()> {
        let node = self.live_node(node_id).await?;
        if node.status() != NodeStatus::Maintenance {
            return Err(DomainError::NotInMaintenance(node_id));
        }

        let cutoff = unix_timestamp() - self.config.stale_threshold_minutes * 60;
        let restored = match node.last_heartbeat {
            Some(ts) if ts >= cutoff => NodeStatus::Online,
            _ => NodeStatus::Offline,
        };
        self.db
            .update_node_status(&node_id.to_string(), restored)
            .await?;
        info!(%node_id, restored = restored.as_str(), "Node left maintenance");
        self.events.publish(FleetEvent::MaintenanceEnded { node_id });
        self.audit
            .log(
                "node.maintenance.end",
                "node",
                &node_id.to_string(),
                AuditOutcome::Success,
                None,
            )
            .await;
        Ok(())
    }

    /// Permanently retire a node: revoke its certificates and soft-delete
    /// the row. Terminal; there is no un-decommission.
    pub async fn decommission(&self, node_id: Uuid) -> DomainResult<()> {
        let id = node_id.to_string();
        let node = self
            .db
            .get_node_including_deleted(&id)
            .await?
            .ok_or(DomainError::NodeNotFound(node_id))?;
        if node.deleted_at.is_some() || node.status() == NodeStatus::Decommissioned {
            return Err(DomainError::NodeDecommissioned(node_id));
        }

        let revoked = self
            .db
            .decommission_node(&id, "Node decommissioned")
            .await?;

        info!(%node_id, revoked, "Node decommissioned");
        self.events.publish(FleetEvent::NodeDecommissioned { node_id });
        self.audit
            .log(
                "node.decommission",
                "node",
                &id,
                AuditOutcome::Success,
                Some(&format!("{revoked} certificates revoked")),
            )
            .await;
        Ok(())
    }

    /// Change a node's display name. The fleet name is immutable; an empty
    /// display name resets it to the fleet name.
    pub async fn rename(&self, node_id: Uuid, display_name: &str) -> DomainResult<()> {
        let node = self.live_node(node_id).await?;

        let trimmed = display_name.trim();
        let display_name = if trimmed.is_empty() { node.name.as_str() } else { trimmed };
        self.db
            .rename_node(&node_id.to_string(), display_name)
            .await?;
        self.audit
            .log(
                "node.rename",
                "node",
                &node_id.to_string(),
                AuditOutcome::Success,
                Some(display_name),
            )
            .await;
        Ok(())
    }
}
