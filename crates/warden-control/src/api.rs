//! Agent-facing request/response shapes.
//!
//! JSON contracts consumed by the node agent. Transport routing lives
//! outside this crate; these structs are the shared vocabulary.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hardware report submitted at enrollment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareReport {
    pub hostname: String,
    pub os_version: String,
    pub cpu_cores: i64,
    pub memory_bytes: i64,
    pub disk_bytes: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_interfaces: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollRequest {
    pub token: String,
    pub platform: String,
    pub hardware: HardwareReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollResponse {
    pub node_id: Uuid,
    /// PEM-encoded client certificate.
    pub certificate: String,
    pub certificate_thumbprint: String,
    /// PEM-encoded private key, returned exactly once and never stored.
    pub private_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub cpu_usage_percent: f64,
    pub memory_usage_percent: f64,
    pub disk_usage_percent: f64,
    pub active_workloads: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub health_issues: Vec<String>,
}

/// Read-only capacity projection for a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableCapacity {
    pub node_id: Uuid,
    pub available_memory_mb: i64,
    pub available_disk_mb: i64,
    pub reserved_memory_mb: i64,
    pub reserved_disk_mb: i64,
    pub effective_memory_mb: i64,
    pub effective_disk_mb: i64,
    pub active_reservations: i64,
}
