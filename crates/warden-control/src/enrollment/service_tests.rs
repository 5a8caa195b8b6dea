//! Enrollment flow tests with a real in-memory CA and database.

#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use uuid::Uuid;

use warden_pki::{
    CaConfig, CertificateAuthority, CertificateValidator, MemoryCaStore, ValidatorConfig,
};

use crate::api::{EnrollRequest, EnrollResponse, HardwareReport};
use crate::audit::NullAuditSink;
use crate::events::{BusPublisher, FleetEvent};
use crate::storage::{ControlDatabase, NodeStatus};

use super::service::{EnrollmentConfig, EnrollmentService};
use super::tokens::TokenIssuer;

const GB: i64 = 1024 * 1024 * 1024;

struct Fixture {
    db: ControlDatabase,
    ca: Arc<CertificateAuthority>,
    service: EnrollmentService,
    bus: Arc<BusPublisher>,
}

async fn fixture() -> Fixture {
    let db = ControlDatabase::open_in_memory().await.unwrap();
    let ca = Arc::new(CertificateAuthority::new(
        CaConfig::default(),
        Arc::new(MemoryCaStore::new()),
        Arc::new(db.clone()),
    ));
    ca.initialize().unwrap();
    let bus = Arc::new(BusPublisher::new(64));
    let service = EnrollmentService::new(
        db.clone(),
        ca.clone(),
        bus.clone(),
        Arc::new(NullAuditSink),
        EnrollmentConfig::default(),
    );
    Fixture {
        db,
        ca,
        service,
        bus,
    }
}

async fn valid_token(db: &ControlDatabase, org_id: &str) -> String {
    TokenIssuer::new(db.clone())
        .issue(org_id, "admin", "rack-3", 3600)
        .await
        .unwrap()
        .plaintext
}

fn request(token: String, hostname: &str) -> EnrollRequest {
    EnrollRequest {
        token,
        platform: "Linux".into(),
        hardware: HardwareReport {
            hostname: hostname.into(),
            os_version: "Ubuntu 24.04".into(),
            cpu_cores: 8,
            memory_bytes: 16 * GB,
            disk_bytes: 500 * GB,
            network_interfaces: vec!["eth0".into()],
        },
    }
}

async fn enroll(fx: &Fixture, hostname: &str) -> EnrollResponse {
    let token = valid_token(&fx.db, "org-1").await;
    fx.service.enroll(&request(token, hostname)).await.unwrap()
}

#[tokio::test]
async fn enrollment_issues_a_verifiable_identity() {
    let fx = fixture().await;
    let mut rx = fx.bus.subscribe();

    let response = enroll(&fx, "Web-01").await;

    assert!(response.certificate.contains("BEGIN CERTIFICATE"));
    assert!(response.private_key.contains("PRIVATE KEY"));

    let node = fx
        .db
        .get_node(&response.node_id.to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(node.name, "web-01");
    assert_eq!(node.status(), NodeStatus::Enrolling);
    assert_eq!(node.platform, "linux");

    // The certificate round-trips through the validation pipeline and
    // carries the node's SPIFFE identity.
    let validator = CertificateValidator::new(fx.ca.clone(), ValidatorConfig::default());
    let agent = validator
        .validate_client_certificate_pem(&response.certificate)
        .await
        .unwrap();
    assert_eq!(agent.node_id, response.node_id);
    assert_eq!(agent.thumbprint, response.certificate_thumbprint);

    assert_eq!(
        rx.recv().await.unwrap(),
        FleetEvent::NodeEnrolled {
            node_id: response.node_id,
            org_id: "org-1".into(),
            name: "web-01".into()
        }
    );
}

#[tokio::test]
async fn capacity_baseline_uses_the_slot_heuristic() {
    let fx = fixture().await;
    // 16 GB / 4 = 4 slots by memory, 8 cores / 2 = 4 by cpu.
    let response = enroll(&fx, "web-01").await;
    let capacity = fx
        .db
        .get_node_capacity(&response.node_id.to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(capacity.max_workload_slots, 4);
    assert_eq!(capacity.available_memory_bytes, 16 * GB);

    // A tiny node still gets one slot.
    let token = valid_token(&fx.db, "org-1").await;
    let mut req = request(token, "pi");
    req.hardware.cpu_cores = 1;
    req.hardware.memory_bytes = GB;
    let response = fx.service.enroll(&req).await.unwrap();
    let capacity = fx
        .db
        .get_node_capacity(&response.node_id.to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(capacity.max_workload_slots, 1);
}

#[tokio::test]
async fn messy_hostnames_become_clean_names() {
    let fx = fixture().await;
    let response = enroll(&fx, "My Server!@#").await;
    let node = fx
        .db
        .get_node(&response.node_id.to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(node.name, "myserver");
    assert!(node.name.chars().all(|c| c.is_ascii_lowercase()
        || c.is_ascii_digit()
        || c == '-'));
}

#[tokio::test]
async fn duplicate_hostnames_get_numeric_suffixes() {
    let fx = fixture().await;
    enroll(&fx, "web-01").await;
    let second = enroll(&fx, "web-01").await;
    let third = enroll(&fx, "Web-01").await;

    let node = fx
        .db
        .get_node(&second.node_id.to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(node.name, "web-01-2");
    let node = fx
        .db
        .get_node(&third.node_id.to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(node.name, "web-01-3");
}

#[tokio::test]
async fn bad_tokens_are_rejected() {
    let fx = fixture().await;

    let err = fx
        .service
        .enroll(&request("not-a-token".into(), "web-01"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_token");

    // A consumed token cannot be redeemed again.
    let token = valid_token(&fx.db, "org-1").await;
    fx.service
        .enroll(&request(token.clone(), "web-01"))
        .await
        .unwrap();
    let err = fx
        .service
        .enroll(&request(token, "web-02"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_token");
}

#[tokio::test]
async fn unsupported_platform_leaves_the_token_redeemable() {
    let fx = fixture().await;
    let token = valid_token(&fx.db, "org-1").await;

    let mut req = request(token.clone(), "web-01");
    req.platform = "macos".into();
    let err = fx.service.enroll(&req).await.unwrap_err();
    assert_eq!(err.code(), "invalid_platform");

    // The rejection consumed nothing.
    fx.service.enroll(&request(token, "web-01")).await.unwrap();
}

#[tokio::test]
async fn renewal_adds_a_certificate_without_revoking_the_old() {
    let fx = fixture().await;
    let response = enroll(&fx, "web-01").await;
    let id = response.node_id.to_string();

    let renewed = fx.service.renew_certificate(response.node_id).await.unwrap();
    assert_ne!(renewed.thumbprint, response.certificate_thumbprint);

    let certs = fx.db.list_node_certificates(&id).await.unwrap();
    assert_eq!(certs.len(), 2);
    assert!(
        !fx.db
            .is_certificate_revoked(&response.certificate_thumbprint)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn decommissioned_nodes_cannot_renew() {
    let fx = fixture().await;
    let response = enroll(&fx, "web-01").await;
    fx.db
        .soft_delete_node(&response.node_id.to_string())
        .await
        .unwrap();

    let err = fx.service.renew_certificate(response.node_id).await.unwrap_err();
    assert_eq!(err.code(), "node_not_found");
}

#[tokio::test]
async fn renewing_an_unknown_node_fails() {
    let fx = fixture().await;
    let err = fx.service.renew_certificate(Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.code(), "node_not_found");
}
