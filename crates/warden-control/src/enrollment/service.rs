//! The enrollment flow.
//!
//! A node presents a bootstrap token and a hardware report; in exchange it
//! gets an identity (node row + SPIFFE client certificate) and a capacity
//! baseline. Everything persists in one transaction, so a failure at any
//! point leaves the token redeemable.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use warden_core::error::{DomainError, DomainResult};
use warden_pki::ca::{CertificateAuthority, IssuedCertificate};

use crate::api::{EnrollRequest, EnrollResponse};
use crate::audit::{AuditOutcome, AuditSink};
use crate::events::{EventPublisher, FleetEvent};
use crate::storage::{ControlDatabase, DatabaseError, EnrollmentRecord, NodeStatus, Platform};

use super::tokens::hash_token;

const BYTES_PER_GB: i64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct EnrollmentConfig {
    /// Memory granted per workload slot.
    pub memory_gb_per_slot: i64,
    /// CPU cores granted per workload slot.
    pub cores_per_slot: i64,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            memory_gb_per_slot: 4,
            cores_per_slot: 2,
        }
    }
}

pub struct EnrollmentService {
    db: ControlDatabase,
    ca: Arc<CertificateAuthority>,
    events: Arc<dyn EventPublisher>,
    audit: Arc<dyn AuditSink>,
    config: EnrollmentConfig,
}

/// Reduce a reported hostname to a fleet name: lowercase `[a-z0-9-]` only,
/// with a fallback when nothing survives.
fn sanitize_hostname(hostname: &str) -> String {
    let name: String = hostname
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect();
    let name = name.trim_matches('-').to_string();
    if name.is_empty() { "node".to_string() } else { name }
}

fn trust_error(err: warden_pki::error::PkiError) -> DomainError {
    DomainError::Trust {
        code: "pki_failure",
        message: err.to_string(),
    }
}

impl EnrollmentService {
    pub fn new(
        db: ControlDatabase,
        ca: Arc<CertificateAuthority>,
        events: Arc<dyn EventPublisher>,
        audit: Arc<dyn AuditSink>,
        config: EnrollmentConfig,
    ) -> Self {
        Self {
            db,
            ca,
            events,
            audit,
            config,
        }
    }

    /// Enroll a node: validate the token, derive a unique name, issue a
    /// client certificate, and persist everything atomically.
    pub async fn enroll(&self, request: &EnrollRequest) -> DomainResult<EnrollResponse> {
        let token_hash = hash_token(&request.token);

        let Some(token) = self.db.get_valid_enrollment_token(&token_hash).await? else {
            warn!("Enrollment rejected: invalid token");
            self.audit
                .log(
                    "node.enroll",
                    "node",
                    "-",
                    AuditOutcome::Failure,
                    Some("invalid_token"),
                )
                .await;
            return Err(DomainError::InvalidToken);
        };

        let Some(platform) = Platform::parse(&request.platform) else {
            self.audit
                .log(
                    "node.enroll",
                    "node",
                    "-",
                    AuditOutcome::Failure,
                    Some("invalid_platform"),
                )
                .await;
            return Err(DomainError::InvalidPlatform(request.platform.clone()));
        };

        let node_id = Uuid::new_v4();
        let name = self
            .unique_node_name(&token.org_id, &request.hardware.hostname)
            .await?;
        let slots = self.workload_slots(
            request.hardware.memory_bytes,
            request.hardware.cpu_cores,
        );

        let issued = self.ca.issue_certificate(node_id).map_err(trust_error)?;

        let node = self
            .db
            .record_enrollment(&EnrollmentRecord {
                node_id: &node_id.to_string(),
                org_id: &token.org_id,
                name: &name,
                display_name: &name,
                platform: platform.as_str(),
                hostname: &request.hardware.hostname,
                os_version: &request.hardware.os_version,
                cpu_cores: request.hardware.cpu_cores,
                memory_bytes: request.hardware.memory_bytes,
                disk_bytes: request.hardware.disk_bytes,
                max_workload_slots: slots,
                cert_thumbprint: &issued.thumbprint,
                cert_serial: &issued.serial_number,
                cert_not_before: issued.not_before,
                cert_not_after: issued.not_after,
                token_hash: &token_hash,
            })
            .await
            .map_err(|e| match e {
                // The token was consumed between validation and commit.
                DatabaseError::NotFound(_) => DomainError::InvalidToken,
                other => DomainError::Storage(other),
            })?;

        info!(%node_id, name = %node.name, org_id = %token.org_id, slots, "Node enrolled");
        self.events.publish(FleetEvent::NodeEnrolled {
            node_id,
            org_id: token.org_id.clone(),
            name: node.name.clone(),
        });
        self.audit
            .log(
                "node.enroll",
                "node",
                &node_id.to_string(),
                AuditOutcome::Success,
                Some(&node.name),
            )
            .await;

        Ok(EnrollResponse {
            node_id,
            certificate: issued.cert_pem,
            certificate_thumbprint: issued.thumbprint,
            private_key: issued.key_pem,
        })
    }

    /// Issue a replacement certificate for an enrolled node. The previous
    /// certificate stays valid until it expires or is revoked explicitly.
    pub async fn renew_certificate(&self, node_id: Uuid) -> DomainResult<IssuedCertificate> {
        let id = node_id.to_string();
        let node = self
            .db
            .get_node(&id)
            .await?
            .ok_or(DomainError::NodeNotFound(node_id))?;
        if node.status() == NodeStatus::Decommissioned {
            return Err(DomainError::NodeDecommissioned(node_id));
        }

        let issued = self.ca.renew_certificate(node_id).map_err(trust_error)?;
        self.db
            .create_certificate(&crate::storage::CertificateParams {
                thumbprint: &issued.thumbprint,
                node_id: &id,
                serial_number: &issued.serial_number,
                not_before: issued.not_before,
                not_after: issued.not_after,
            })
            .await?;

        info!(%node_id, thumbprint = %issued.thumbprint, "Certificate renewed");
        self.audit
            .log(
                "certificate.renew",
                "certificate",
                &issued.thumbprint,
                AuditOutcome::Success,
                None,
            )
            .await;
        Ok(issued)
    }

    /// First free name among `base`, `base-2`, `base-3`, ... within the org.
    async fn unique_node_name(&self, org_id: &str, hostname: &str) -> DomainResult<String> {
        let base = sanitize_hostname(hostname);
        if !self.db.node_name_exists(org_id, &base).await? {
            return Ok(base);
        }
        let mut suffix = 2;
        loop {
            let candidate = format!("{base}-{suffix}");
            if !self.db.node_name_exists(org_id, &candidate).await? {
                return Ok(candidate);
            }
            suffix += 1;
        }
    }

    /// Slot heuristic: a slot costs memory and cores; the scarcer resource
    /// wins, with a floor of one slot.
    fn workload_slots(&self, memory_bytes: i64, cpu_cores: i64) -> i64 {
        let by_memory = (memory_bytes / BYTES_PER_GB) / self.config.memory_gb_per_slot;
        let by_cores = cpu_cores / self.config.cores_per_slot;
        by_memory.min(by_cores).max(1)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn hostnames_are_reduced_to_fleet_names() {
        assert_eq!(sanitize_hostname("Web-01"), "web-01");
        assert_eq!(sanitize_hostname("My Server!@#"), "myserver");
        assert_eq!(sanitize_hostname("--edge--"), "edge");
        assert_eq!(sanitize_hostname("!!!"), "node");
    }
}
