//! Enrollment token queries.
//!
//! Only the SHA-256 hash of a token is ever stored; validity is a single
//! indexed lookup. Consumption happens inside the enrollment transaction
//! (see `queries_nodes.rs`) so a token can never be spent twice.

use warden_core::db::{DatabaseError, unix_timestamp};

use super::db::ControlDatabase;
use super::models::EnrollmentToken;

impl ControlDatabase {
    /// Store a new enrollment token hash with its metadata.
    pub async fn create_enrollment_token(
        &self,
        token_hash: &str,
        org_id: &str,
        created_by: &str,
        label: &str,
        expires_at: i64,
    ) -> Result<EnrollmentToken, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO enrollment_tokens
             (token_hash, org_id, created_by, label, expires_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(token_hash)
        .bind(org_id)
        .bind(created_by)
        .bind(label)
        .bind(expires_at)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_enrollment_token(token_hash)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Enrollment token {token_hash}")))
    }

    /// Get a token row by hash, regardless of state.
    pub async fn get_enrollment_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<EnrollmentToken>, DatabaseError> {
        let token = sqlx::query_as::<_, EnrollmentToken>(
            "SELECT * FROM enrollment_tokens WHERE token_hash = ?",
        )
        .bind(token_hash)
        .fetch_optional(self.pool())
        .await?;
        Ok(token)
    }

    /// Find a redeemable token: not expired, not revoked, not already used.
    ///
    /// Expired, revoked, used, and never-existed all collapse to `None` so
    /// callers cannot enumerate token state.
    pub async fn get_valid_enrollment_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<EnrollmentToken>, DatabaseError> {
        let now = unix_timestamp();
        let token = sqlx::query_as::<_, EnrollmentToken>(
            "SELECT * FROM enrollment_tokens
             WHERE token_hash = ? AND used = 0 AND revoked = 0 AND expires_at > ?",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;
        Ok(token)
    }

    /// Revoke an enrollment token by hash.
    pub async fn revoke_enrollment_token(&self, token_hash: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE enrollment_tokens SET revoked = 1 WHERE token_hash = ?")
            .bind(token_hash)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
