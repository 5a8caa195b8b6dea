//! Data models for Warden control-plane storage.
//!
//! Row structs mirror the SQLite schema (status columns are stored as
//! strings); the typed enums alongside them are what services reason about.

use serde::{Deserialize, Serialize};

/// Node lifecycle status.
///
/// `Maintenance` and `Decommissioned` are sticky: no automatic transition
/// leaves them, only explicit operator actions do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Enrolling,
    Online,
    Degraded,
    Offline,
    Maintenance,
    Decommissioned,
}

impl NodeStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enrolling => "enrolling",
            Self::Online => "online",
            Self::Degraded => "degraded",
            Self::Offline => "offline",
            Self::Maintenance => "maintenance",
            Self::Decommissioned => "decommissioned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "enrolling" => Some(Self::Enrolling),
            "online" => Some(Self::Online),
            "degraded" => Some(Self::Degraded),
            "offline" => Some(Self::Offline),
            "maintenance" => Some(Self::Maintenance),
            "decommissioned" => Some(Self::Decommissioned),
            _ => None,
        }
    }
}

/// Supported node platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Windows,
}

impl Platform {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
        }
    }

    /// Case-insensitive parse; anything but linux/windows is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "linux" => Some(Self::Linux),
            "windows" => Some(Self::Windows),
            _ => None,
        }
    }
}

/// Reservation lifecycle. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Claimed,
    Released,
    Expired,
}

impl ReservationStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Released => "released",
            Self::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "claimed" => Some(Self::Claimed),
            "released" => Some(Self::Released),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// Health score movement between consecutive heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthTrend {
    Improving,
    Stable,
    Declining,
}

impl HealthTrend {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Stable => "stable",
            Self::Declining => "declining",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "improving" => Some(Self::Improving),
            "stable" => Some(Self::Stable),
            "declining" => Some(Self::Declining),
            _ => None,
        }
    }
}

/// Reporting category derived from a health score. Note there is no
/// `Critical` node status; critical-range scores map to `Degraded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthCategory {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Node {
    pub id: String,
    pub org_id: String,
    pub name: String,
    pub display_name: String,
    pub platform: String,
    pub status: String,
    pub tags: String,
    pub agent_version: Option<String>,
    pub last_heartbeat: Option<i64>,
    pub created_at: i64,
    pub deleted_at: Option<i64>,
}

impl Node {
    pub fn status(&self) -> NodeStatus {
        NodeStatus::parse(&self.status).unwrap_or(NodeStatus::Offline)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct HardwareInventory {
    pub node_id: String,
    pub hostname: String,
    pub os_version: String,
    pub cpu_cores: i64,
    pub memory_bytes: i64,
    pub disk_bytes: i64,
    pub recorded_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NodeCapacity {
    pub node_id: String,
    pub max_workload_slots: i64,
    pub current_workloads: i64,
    pub available_memory_bytes: i64,
    pub available_disk_bytes: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CapacityReservation {
    pub token: String,
    pub node_id: String,
    pub memory_mb: i64,
    pub disk_mb: i64,
    pub cpu_millicores: i64,
    pub requested_by: String,
    pub status: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub claimed_at: Option<i64>,
    pub claimed_by_server: Option<String>,
}

impl CapacityReservation {
    pub fn status(&self) -> ReservationStatus {
        ReservationStatus::parse(&self.status).unwrap_or(ReservationStatus::Expired)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AgentCertificate {
    pub thumbprint: String,
    pub node_id: String,
    pub serial_number: String,
    pub not_before: i64,
    pub not_after: i64,
    pub issued_at: i64,
    pub revoked: i64,
    pub revoked_reason: Option<String>,
    pub revoked_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EnrollmentToken {
    pub token_hash: String,
    pub org_id: String,
    pub created_by: String,
    pub label: String,
    pub expires_at: i64,
    pub created_at: i64,
    pub used: i64,
    pub used_by_node: Option<String>,
    pub used_at: Option<i64>,
    pub revoked: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NodeHealth {
    pub node_id: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub active_workloads: i64,
    pub health_issues: String,
    pub score: i64,
    pub trend: String,
    pub last_score_change: i64,
    pub updated_at: i64,
}

impl NodeHealth {
    pub fn trend(&self) -> HealthTrend {
        HealthTrend::parse(&self.trend).unwrap_or(HealthTrend::Stable)
    }

    pub fn issues(&self) -> Vec<String> {
        serde_json::from_str(&self.health_issues).unwrap_or_default()
    }
}
