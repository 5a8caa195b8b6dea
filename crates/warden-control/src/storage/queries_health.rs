//! Node health queries. One row per node, upserted on every heartbeat.

use warden_core::db::{DatabaseError, unix_timestamp};

use super::db::ControlDatabase;
use super::models::{HealthTrend, NodeHealth};

/// Parameters for upserting a node's health row.
pub struct HealthParams<'a> {
    pub node_id: &'a str,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub active_workloads: i64,
    /// JSON array of free-text issues.
    pub health_issues: &'a str,
    pub score: i64,
    pub trend: HealthTrend,
    pub last_score_change: i64,
}

impl ControlDatabase {
    /// Get a node's latest health record.
    pub async fn get_node_health(
        &self,
        node_id: &str,
    ) -> Result<Option<NodeHealth>, DatabaseError> {
        let health = sqlx::query_as::<_, NodeHealth>("SELECT * FROM node_health WHERE node_id = ?")
            .bind(node_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(health)
    }

    /// Insert or replace a node's health row.
    pub async fn upsert_node_health(
        &self,
        params: &HealthParams<'_>,
    ) -> Result<(), DatabaseError> {
        let now = unix_timestamp();
        sqlx::query(
            "INSERT INTO node_health
             (node_id, cpu_percent, memory_percent, disk_percent, active_workloads,
              health_issues, score, trend, last_score_change, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (node_id) DO UPDATE SET
                 cpu_percent = excluded.cpu_percent,
                 memory_percent = excluded.memory_percent,
                 disk_percent = excluded.disk_percent,
                 active_workloads = excluded.active_workloads,
                 health_issues = excluded.health_issues,
                 score = excluded.score,
                 trend = excluded.trend,
                 last_score_change = excluded.last_score_change,
                 updated_at = excluded.updated_at",
        )
        .bind(params.node_id)
        .bind(params.cpu_percent)
        .bind(params.memory_percent)
        .bind(params.disk_percent)
        .bind(params.active_workloads)
        .bind(params.health_issues)
        .bind(params.score)
        .bind(params.trend.as_str())
        .bind(params.last_score_change)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
