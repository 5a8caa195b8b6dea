//! Node queries, including the transactional enrollment write.

use warden_core::db::{DatabaseError, unix_timestamp};

use super::db::ControlDatabase;
use super::models::{HardwareInventory, Node, NodeStatus};

/// Everything enrollment persists atomically: the node, its hardware
/// inventory, its capacity baseline, its first certificate, and the
/// consumed token.
pub struct EnrollmentRecord<'a> {
    pub node_id: &'a str,
    pub org_id: &'a str,
    pub name: &'a str,
    pub display_name: &'a str,
    pub platform: &'a str,
    pub hostname: &'a str,
    pub os_version: &'a str,
    pub cpu_cores: i64,
    pub memory_bytes: i64,
    pub disk_bytes: i64,
    pub max_workload_slots: i64,
    pub cert_thumbprint: &'a str,
    pub cert_serial: &'a str,
    pub cert_not_before: i64,
    pub cert_not_after: i64,
    pub token_hash: &'a str,
}

impl ControlDatabase {
    // =========================================================================
    // Node queries
    // =========================================================================

    /// Get a live (non-deleted) node by ID.
    pub async fn get_node(&self, id: &str) -> Result<Option<Node>, DatabaseError> {
        let node =
            sqlx::query_as::<_, Node>("SELECT * FROM nodes WHERE id = ? AND deleted_at IS NULL")
                .bind(id)
                .fetch_optional(self.pool())
                .await?;
        Ok(node)
    }

    /// Get a node regardless of soft deletion (administrative flows only).
    pub async fn get_node_including_deleted(
        &self,
        id: &str,
    ) -> Result<Option<Node>, DatabaseError> {
        let node = sqlx::query_as::<_, Node>("SELECT * FROM nodes WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(node)
    }

    /// List live nodes for an organization.
    pub async fn list_nodes(&self, org_id: &str) -> Result<Vec<Node>, DatabaseError> {
        let nodes = sqlx::query_as::<_, Node>(
            "SELECT * FROM nodes WHERE org_id = ? AND deleted_at IS NULL ORDER BY name",
        )
        .bind(org_id)
        .fetch_all(self.pool())
        .await?;
        Ok(nodes)
    }

    /// Whether a live node with this name exists in the organization.
    pub async fn node_name_exists(
        &self,
        org_id: &str,
        name: &str,
    ) -> Result<bool, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM nodes WHERE org_id = ? AND name = ? AND deleted_at IS NULL",
        )
        .bind(org_id)
        .bind(name)
        .fetch_one(self.pool())
        .await?;
        Ok(row.0 > 0)
    }

    /// Update a node's status.
    pub async fn update_node_status(
        &self,
        id: &str,
        status: NodeStatus,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE nodes SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Record a heartbeat arrival: `last_heartbeat` and, when reported, the
    /// agent version.
    pub async fn touch_node_heartbeat(
        &self,
        id: &str,
        agent_version: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let now = unix_timestamp();
        match agent_version {
            Some(version) => {
                sqlx::query("UPDATE nodes SET last_heartbeat = ?, agent_version = ? WHERE id = ?")
                    .bind(now)
                    .bind(version)
                    .bind(id)
                    .execute(self.pool())
                    .await?;
            }
            None => {
                sqlx::query("UPDATE nodes SET last_heartbeat = ? WHERE id = ?")
                    .bind(now)
                    .bind(id)
                    .execute(self.pool())
                    .await?;
            }
        }
        Ok(())
    }

    /// Update a node's display name.
    pub async fn rename_node(&self, id: &str, display_name: &str) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE nodes SET display_name = ? WHERE id = ?")
            .bind(display_name)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Soft-delete a node and mark it decommissioned.
    pub async fn soft_delete_node(&self, id: &str) -> Result<(), DatabaseError> {
        let now = unix_timestamp();
        sqlx::query("UPDATE nodes SET status = ?, deleted_at = ? WHERE id = ?")
            .bind(NodeStatus::Decommissioned.as_str())
            .bind(now)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Decommission a node: revoke its live certificates and soft-delete the
    /// row, in one transaction. Returns the number of certificates revoked.
    pub async fn decommission_node(
        &self,
        id: &str,
        reason: &str,
    ) -> Result<u64, DatabaseError> {
        let now = unix_timestamp();
        let mut tx = self.pool().begin().await?;

        let revoked = sqlx::query(
            "UPDATE agent_certificates
             SET revoked = 1, revoked_reason = ?, revoked_at = ?
             WHERE node_id = ? AND revoked = 0",
        )
        .bind(reason)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE nodes SET status = ?, deleted_at = ? WHERE id = ?")
            .bind(NodeStatus::Decommissioned.as_str())
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(revoked.rows_affected())
    }

    /// Live nodes in `Online`/`Degraded` whose heartbeat is missing or older
    /// than the cutoff. `Maintenance`, `Decommissioned`, and already-offline
    /// nodes are excluded.
    pub async fn list_stale_nodes(&self, cutoff: i64) -> Result<Vec<Node>, DatabaseError> {
        let nodes = sqlx::query_as::<_, Node>(
            "SELECT * FROM nodes
             WHERE status IN ('online', 'degraded')
               AND deleted_at IS NULL
               AND (last_heartbeat IS NULL OR last_heartbeat < ?)",
        )
        .bind(cutoff)
        .fetch_all(self.pool())
        .await?;
        Ok(nodes)
    }

    /// Get a node's hardware inventory.
    pub async fn get_hardware_inventory(
        &self,
        node_id: &str,
    ) -> Result<Option<HardwareInventory>, DatabaseError> {
        let hw = sqlx::query_as::<_, HardwareInventory>(
            "SELECT * FROM hardware_inventory WHERE node_id = ?",
        )
        .bind(node_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(hw)
    }

    // =========================================================================
    // Enrollment transaction
    // =========================================================================

    /// Persist a complete enrollment atomically.
    ///
    /// Inserts the node, hardware inventory, capacity baseline, and first
    /// certificate, and consumes the token, in one transaction. A failure
    /// anywhere rolls the whole enrollment back; in particular the token
    /// stays unused.
    pub async fn record_enrollment(
        &self,
        record: &EnrollmentRecord<'_>,
    ) -> Result<Node, DatabaseError> {
        let now = unix_timestamp();
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            "INSERT INTO nodes (id, org_id, name, display_name, platform, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.node_id)
        .bind(record.org_id)
        .bind(record.name)
        .bind(record.display_name)
        .bind(record.platform)
        .bind(NodeStatus::Enrolling.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO hardware_inventory
             (node_id, hostname, os_version, cpu_cores, memory_bytes, disk_bytes, recorded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.node_id)
        .bind(record.hostname)
        .bind(record.os_version)
        .bind(record.cpu_cores)
        .bind(record.memory_bytes)
        .bind(record.disk_bytes)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO node_capacity
             (node_id, max_workload_slots, current_workloads,
              available_memory_bytes, available_disk_bytes, updated_at)
             VALUES (?, ?, 0, ?, ?, ?)",
        )
        .bind(record.node_id)
        .bind(record.max_workload_slots)
        .bind(record.memory_bytes)
        .bind(record.disk_bytes)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO agent_certificates
             (thumbprint, node_id, serial_number, not_before, not_after, issued_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(record.cert_thumbprint)
        .bind(record.node_id)
        .bind(record.cert_serial)
        .bind(record.cert_not_before)
        .bind(record.cert_not_after)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let consumed = sqlx::query(
            "UPDATE enrollment_tokens
             SET used = 1, used_by_node = ?, used_at = ?
             WHERE token_hash = ? AND used = 0 AND revoked = 0",
        )
        .bind(record.node_id)
        .bind(now)
        .bind(record.token_hash)
        .execute(&mut *tx)
        .await?;

        // A concurrent enrollment consumed the token between validation and
        // this write; the whole enrollment must not stand.
        if consumed.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(DatabaseError::NotFound(format!(
                "Enrollment token {}",
                record.token_hash
            )));
        }

        tx.commit().await?;

        self.get_node(record.node_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Node {}", record.node_id)))
    }
}
