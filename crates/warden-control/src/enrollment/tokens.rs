//! Bootstrap token issuance.
//!
//! A token is 32 random bytes, hex-encoded, shown to the operator exactly
//! once. Storage only ever sees the SHA-256 of it, so a database leak does
//! not leak redeemable tokens.

use sha2::{Digest, Sha256};
use tracing::info;

use warden_core::error::DomainResult;

use crate::storage::{ControlDatabase, EnrollmentToken};

/// Default token validity: one hour.
pub const DEFAULT_TOKEN_TTL_SECONDS: i64 = 3600;

/// Hex SHA-256 of a plaintext token.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// A freshly minted token. `plaintext` exists only in this struct; after it
/// is handed to the operator, only the hash remains.
pub struct IssuedToken {
    pub plaintext: String,
    pub record: EnrollmentToken,
}

pub struct TokenIssuer {
    db: ControlDatabase,
}

impl TokenIssuer {
    pub const fn new(db: ControlDatabase) -> Self {
        Self { db }
    }

    /// Mint a single-use enrollment token for an organization.
    pub async fn issue(
        &self,
        org_id: &str,
        created_by: &str,
        label: &str,
        ttl_seconds: i64,
    ) -> DomainResult<IssuedToken> {
        let plaintext = hex::encode(rand::random::<[u8; 32]>());
        let hash = hash_token(&plaintext);
        let expires_at = warden_core::db::unix_timestamp() + ttl_seconds;

        let record = self
            .db
            .create_enrollment_token(&hash, org_id, created_by, label, expires_at)
            .await?;
        info!(org_id, label, expires_at, "Enrollment token issued");

        Ok(IssuedToken { plaintext, record })
    }

    /// Check a plaintext token without consuming it. Returns the stored
    /// record when the token is redeemable; expired, revoked, used, and
    /// unknown tokens are indistinguishable (all `None`).
    pub async fn validate_token(
        &self,
        plaintext: &str,
    ) -> DomainResult<Option<EnrollmentToken>> {
        Ok(self
            .db
            .get_valid_enrollment_token(&hash_token(plaintext))
            .await?)
    }

    /// Revoke an unredeemed token. Returns whether a row was affected.
    pub async fn revoke(&self, token_hash: &str) -> DomainResult<bool> {
        let revoked = self.db.revoke_enrollment_token(token_hash).await?;
        if revoked {
            info!(token_hash, "Enrollment token revoked");
        }
        Ok(revoked)
    }
}
