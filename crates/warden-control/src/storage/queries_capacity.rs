//! Capacity and reservation queries.
//!
//! Reservations are append-mostly ledger rows; the status column is the only
//! thing that ever changes after insert. Claim and release are conditional
//! single-row updates so racing callers cannot both win.

use warden_core::db::{DatabaseError, unix_timestamp};

use super::db::ControlDatabase;
use super::models::{CapacityReservation, NodeCapacity};

/// Parameters for creating a reservation.
pub struct ReservationParams<'a> {
    pub token: &'a str,
    pub node_id: &'a str,
    pub memory_mb: i64,
    pub disk_mb: i64,
    pub cpu_millicores: i64,
    pub requested_by: &'a str,
    pub expires_at: i64,
}

/// Memory/disk committed by active reservations, plus their count.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActiveCommitments {
    pub memory_mb: i64,
    pub disk_mb: i64,
    pub count: i64,
}

impl ControlDatabase {
    /// Get a node's capacity record.
    pub async fn get_node_capacity(
        &self,
        node_id: &str,
    ) -> Result<Option<NodeCapacity>, DatabaseError> {
        let capacity =
            sqlx::query_as::<_, NodeCapacity>("SELECT * FROM node_capacity WHERE node_id = ?")
                .bind(node_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(capacity)
    }

    /// Overwrite a node's reported spare capacity (capacity-report path,
    /// driven by external collaborators).
    pub async fn update_capacity_report(
        &self,
        node_id: &str,
        available_memory_bytes: i64,
        available_disk_bytes: i64,
        current_workloads: i64,
    ) -> Result<(), DatabaseError> {
        let now = unix_timestamp();
        sqlx::query(
            "UPDATE node_capacity
             SET available_memory_bytes = ?, available_disk_bytes = ?,
                 current_workloads = ?, updated_at = ?
             WHERE node_id = ?",
        )
        .bind(available_memory_bytes)
        .bind(available_disk_bytes)
        .bind(current_workloads)
        .bind(now)
        .bind(node_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Sum of memory and disk committed by active (`Pending` non-expired +
    /// `Claimed`) reservations for a node.
    pub async fn active_commitments(
        &self,
        node_id: &str,
    ) -> Result<ActiveCommitments, DatabaseError> {
        let now = unix_timestamp();
        let row: (i64, i64, i64) = sqlx::query_as(
            "SELECT COALESCE(SUM(memory_mb), 0), COALESCE(SUM(disk_mb), 0), COUNT(*)
             FROM capacity_reservations
             WHERE node_id = ?
               AND (status = 'claimed' OR (status = 'pending' AND expires_at > ?))",
        )
        .bind(node_id)
        .bind(now)
        .fetch_one(self.pool())
        .await?;
        Ok(ActiveCommitments {
            memory_mb: row.0,
            disk_mb: row.1,
            count: row.2,
        })
    }

    /// Insert a fresh `Pending` reservation.
    pub async fn create_reservation(
        &self,
        params: &ReservationParams<'_>,
    ) -> Result<CapacityReservation, DatabaseError> {
        let now = unix_timestamp();
        sqlx::query(
            "INSERT INTO capacity_reservations
             (token, node_id, memory_mb, disk_mb, cpu_millicores, requested_by,
              status, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?)",
        )
        .bind(params.token)
        .bind(params.node_id)
        .bind(params.memory_mb)
        .bind(params.disk_mb)
        .bind(params.cpu_millicores)
        .bind(params.requested_by)
        .bind(now)
        .bind(params.expires_at)
        .execute(self.pool())
        .await?;

        self.get_reservation(params.token)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Reservation {}", params.token)))
    }

    /// Get a reservation by token.
    pub async fn get_reservation(
        &self,
        token: &str,
    ) -> Result<Option<CapacityReservation>, DatabaseError> {
        let reservation = sqlx::query_as::<_, CapacityReservation>(
            "SELECT * FROM capacity_reservations WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(self.pool())
        .await?;
        Ok(reservation)
    }

    /// Active reservations for a node (`Pending` non-expired + `Claimed`).
    pub async fn list_active_reservations(
        &self,
        node_id: &str,
    ) -> Result<Vec<CapacityReservation>, DatabaseError> {
        let now = unix_timestamp();
        let reservations = sqlx::query_as::<_, CapacityReservation>(
            "SELECT * FROM capacity_reservations
             WHERE node_id = ?
               AND (status = 'claimed' OR (status = 'pending' AND expires_at > ?))
             ORDER BY created_at",
        )
        .bind(node_id)
        .bind(now)
        .fetch_all(self.pool())
        .await?;
        Ok(reservations)
    }

    /// Transition `Pending -> Claimed`. The status predicate makes racing
    /// claims lose cleanly; the caller re-reads to report the precise error.
    pub async fn claim_reservation(
        &self,
        token: &str,
        server_id: &str,
    ) -> Result<bool, DatabaseError> {
        let now = unix_timestamp();
        let result = sqlx::query(
            "UPDATE capacity_reservations
             SET status = 'claimed', claimed_at = ?, claimed_by_server = ?
             WHERE token = ? AND status = 'pending' AND expires_at > ?",
        )
        .bind(now)
        .bind(server_id)
        .bind(token)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Transition `Pending -> Released`.
    pub async fn release_reservation(&self, token: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE capacity_reservations
             SET status = 'released'
             WHERE token = ? AND status = 'pending'",
        )
        .bind(token)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Sweep: every `Pending` reservation past its expiry becomes `Expired`.
    /// Returns the expired rows so the caller can publish one event each.
    /// `Claimed` reservations are never touched.
    pub async fn expire_stale_reservations(
        &self,
    ) -> Result<Vec<CapacityReservation>, DatabaseError> {
        let now = unix_timestamp();
        let expired = sqlx::query_as::<_, CapacityReservation>(
            "UPDATE capacity_reservations
             SET status = 'expired'
             WHERE status = 'pending' AND expires_at < ?
             RETURNING *",
        )
        .bind(now)
        .fetch_all(self.pool())
        .await?;
        Ok(expired)
    }
}
