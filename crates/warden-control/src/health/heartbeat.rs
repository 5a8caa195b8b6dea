//! Heartbeat processing and stale-node detection.
//!
//! Every heartbeat updates the node's health row and may move its status.
//! Status movement is conservative: `Maintenance` and `Decommissioned` are
//! never touched, and a node saturating any resource is degraded no matter
//! how good its composite score looks.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use warden_core::db::unix_timestamp;
use warden_core::error::{DomainError, DomainResult};

use crate::api::HeartbeatRequest;
use crate::events::{EventPublisher, FleetEvent};
use crate::storage::{ControlDatabase, HealthCategory, HealthParams, HealthTrend, NodeStatus};

use super::score::{
    ScoringConfig, calculate_health_score, determine_health_trend, get_health_category,
    should_transition_status,
};

#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub scoring: ScoringConfig,
    /// Nodes silent longer than this are marked offline by the sweep.
    pub stale_threshold_minutes: i64,
    /// Any single resource at or above this forces `Degraded`.
    pub forced_degraded_percent: f64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            stale_threshold_minutes: 5,
            forced_degraded_percent: 90.0,
        }
    }
}

/// What a processed heartbeat produced.
#[derive(Debug, Clone)]
pub struct HeartbeatOutcome {
    pub score: i64,
    pub trend: HealthTrend,
    pub category: HealthCategory,
    pub status: NodeStatus,
}

pub struct HeartbeatService {
    db: ControlDatabase,
    events: Arc<dyn EventPublisher>,
    config: HeartbeatConfig,
}

impl HeartbeatService {
    pub fn new(
        db: ControlDatabase,
        events: Arc<dyn EventPublisher>,
        config: HeartbeatConfig,
    ) -> Self {
        Self { db, events, config }
    }

    /// Process one heartbeat: record arrival, score health, and apply any
    /// status transition the score (or a saturated resource) calls for.
    pub async fn process_heartbeat(
        &self,
        node_id: Uuid,
        report: &HeartbeatRequest,
    ) -> DomainResult<HeartbeatOutcome> {
        let id = node_id.to_string();
        let node = self
            .db
            .get_node_including_deleted(&id)
            .await?
            .ok_or(DomainError::NodeNotFound(node_id))?;

        if node.deleted_at.is_some() || node.status() == NodeStatus::Decommissioned {
            return Err(DomainError::NodeDecommissioned(node_id));
        }

        self.db
            .touch_node_heartbeat(&id, report.agent_version.as_deref())
            .await?;

        let score = calculate_health_score(
            report.cpu_usage_percent,
            report.memory_usage_percent,
            report.disk_usage_percent,
            report.health_issues.len(),
            &self.config.scoring,
        );

        let prior = self.db.get_node_health(&id).await?;
        // A node with no history starts from a perfect score, so the first
        // heartbeat of a struggling node reads as declining.
        let previous_score = prior.as_ref().map_or(100, |h| h.score);
        let trend = determine_health_trend(score, previous_score, &self.config.scoring);

        let now = unix_timestamp();
        let last_score_change = match prior.as_ref() {
            Some(h) if h.score == score => h.last_score_change,
            _ => now,
        };

        let issues_json =
            serde_json::to_string(&report.health_issues).unwrap_or_else(|_| "[]".into());
        self.db
            .upsert_node_health(&HealthParams {
                node_id: &id,
                cpu_percent: report.cpu_usage_percent,
                memory_percent: report.memory_usage_percent,
                disk_percent: report.disk_usage_percent,
                active_workloads: report.active_workloads,
                health_issues: &issues_json,
                score,
                trend,
                last_score_change,
            })
            .await?;

        let current = node.status();
        let status = self.apply_transition(node_id, current, score, report).await?;

        Ok(HeartbeatOutcome {
            score,
            trend,
            category: get_health_category(score, &self.config.scoring),
            status,
        })
    }

    async fn apply_transition(
        &self,
        node_id: Uuid,
        current: NodeStatus,
        score: i64,
        report: &HeartbeatRequest,
    ) -> DomainResult<NodeStatus> {
        // First heartbeat completes enrollment regardless of score.
        if current == NodeStatus::Enrolling {
            self.db
                .update_node_status(&node_id.to_string(), NodeStatus::Online)
                .await?;
            info!(%node_id, "Node completed enrollment, now online");
            self.events.publish(FleetEvent::NodeOnline { node_id });
            return Ok(NodeStatus::Online);
        }

        if current == NodeStatus::Maintenance {
            return Ok(current);
        }

        let saturated = report.cpu_usage_percent >= self.config.forced_degraded_percent
            || report.memory_usage_percent >= self.config.forced_degraded_percent
            || report.disk_usage_percent >= self.config.forced_degraded_percent;
        let forced = saturated || !report.health_issues.is_empty();

        let target = if forced {
            (current != NodeStatus::Degraded).then_some(NodeStatus::Degraded)
        } else {
            should_transition_status(current, score, &self.config.scoring)
        };

        let Some(target) = target else {
            return Ok(current);
        };

        self.db
            .update_node_status(&node_id.to_string(), target)
            .await?;
        info!(%node_id, from = current.as_str(), to = target.as_str(), score, "Node status transition");

        match target {
            NodeStatus::Online if current == NodeStatus::Degraded => {
                self.events.publish(FleetEvent::NodeRecovered { node_id });
            }
            NodeStatus::Online => {
                self.events.publish(FleetEvent::NodeOnline { node_id });
            }
            NodeStatus::Degraded => {
                self.events.publish(FleetEvent::NodeDegraded {
                    node_id,
                    issues: report.health_issues.clone(),
                });
            }
            _ => {}
        }

        Ok(target)
    }

    /// Mark nodes whose heartbeat is older than the threshold as offline.
    /// Returns how many nodes were transitioned.
    pub async fn check_stale_nodes(&self) -> DomainResult<usize> {
        let cutoff = unix_timestamp() - self.config.stale_threshold_minutes * 60;
        let stale = self.db.list_stale_nodes(cutoff).await?;

        let mut transitioned = 0;
        for node in stale {
            let Ok(node_id) = Uuid::parse_str(&node.id) else {
                warn!(id = %node.id, "Skipping node with malformed ID");
                continue;
            };
            self.db
                .update_node_status(&node.id, NodeStatus::Offline)
                .await?;
            warn!(%node_id, last_heartbeat = ?node.last_heartbeat, "Node missed heartbeat deadline, marking offline");
            self.events.publish(FleetEvent::NodeOffline {
                node_id,
                reason: "Heartbeat timeout".into(),
            });
            transitioned += 1;
        }

        Ok(transitioned)
    }
}
