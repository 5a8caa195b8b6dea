//! Agent certificate queries and the revocation lookup seam.
//!
//! The certificate thumbprint (hex SHA-256 of the DER) is the primary key
//! and the revocation key. Rows are never deleted; revocation is a flag.

use warden_core::db::{DatabaseError, unix_timestamp};
use warden_pki::{PkiError, RevocationLookup};

use super::db::ControlDatabase;
use super::models::AgentCertificate;

/// Parameters for recording an issued certificate.
pub struct CertificateParams<'a> {
    pub thumbprint: &'a str,
    pub node_id: &'a str,
    pub serial_number: &'a str,
    pub not_before: i64,
    pub not_after: i64,
}

impl ControlDatabase {
    /// Record an issued certificate.
    pub async fn create_certificate(
        &self,
        params: &CertificateParams<'_>,
    ) -> Result<AgentCertificate, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO agent_certificates
             (thumbprint, node_id, serial_number, not_before, not_after, issued_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(params.thumbprint)
        .bind(params.node_id)
        .bind(params.serial_number)
        .bind(params.not_before)
        .bind(params.not_after)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_certificate(params.thumbprint)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Certificate {}", params.thumbprint)))
    }

    /// Look up a certificate by thumbprint.
    pub async fn get_certificate(
        &self,
        thumbprint: &str,
    ) -> Result<Option<AgentCertificate>, DatabaseError> {
        let cert = sqlx::query_as::<_, AgentCertificate>(
            "SELECT * FROM agent_certificates WHERE thumbprint = ?",
        )
        .bind(thumbprint)
        .fetch_optional(self.pool())
        .await?;
        Ok(cert)
    }

    /// List all certificates ever issued to a node.
    pub async fn list_node_certificates(
        &self,
        node_id: &str,
    ) -> Result<Vec<AgentCertificate>, DatabaseError> {
        let certs = sqlx::query_as::<_, AgentCertificate>(
            "SELECT * FROM agent_certificates WHERE node_id = ? ORDER BY issued_at DESC",
        )
        .bind(node_id)
        .fetch_all(self.pool())
        .await?;
        Ok(certs)
    }

    /// Check whether a certificate thumbprint is revoked.
    ///
    /// Returns `false` for unknown thumbprints; chain validation rejects
    /// certificates this CA never issued.
    pub async fn is_certificate_revoked(&self, thumbprint: &str) -> Result<bool, DatabaseError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT revoked FROM agent_certificates WHERE thumbprint = ?")
                .bind(thumbprint)
                .fetch_optional(self.pool())
                .await?;
        Ok(row.is_some_and(|(revoked,)| revoked != 0))
    }

    /// Revoke a certificate by thumbprint. Irreversible.
    pub async fn revoke_certificate(
        &self,
        thumbprint: &str,
        reason: &str,
    ) -> Result<bool, DatabaseError> {
        let now = unix_timestamp();
        let result = sqlx::query(
            "UPDATE agent_certificates
             SET revoked = 1, revoked_reason = ?, revoked_at = ?
             WHERE thumbprint = ? AND revoked = 0",
        )
        .bind(reason)
        .bind(now)
        .bind(thumbprint)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl RevocationLookup for ControlDatabase {
    async fn is_revoked(&self, thumbprint: &str) -> Result<bool, PkiError> {
        self.is_certificate_revoked(thumbprint)
            .await
            .map_err(|e| PkiError::RevocationLookup(e.to_string()))
    }
}
