//! Health scoring.
//!
//! Pure functions from resource metrics to a 0-100 score, a trend, and a
//! status recommendation. All tunables live in [`ScoringConfig`] so the
//! heartbeat pipeline and tests share one source of defaults.

use crate::storage::{HealthCategory, HealthTrend, NodeStatus};

/// Weights, thresholds, and penalties for health scoring.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub weight_cpu: f64,
    pub weight_memory: f64,
    pub weight_disk: f64,
    pub weight_issues: f64,
    /// Score deduction per reported issue; 5 issues zero out the issue term.
    pub issue_penalty: f64,
    /// Scores at or above this are healthy.
    pub healthy_threshold: i64,
    /// Scores below this are critical (reporting category only).
    pub degraded_threshold: i64,
    /// Minimum score delta that counts as a trend change.
    pub trend_threshold: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weight_cpu: 0.25,
            weight_memory: 0.30,
            weight_disk: 0.20,
            weight_issues: 0.25,
            issue_penalty: 20.0,
            healthy_threshold: 80,
            degraded_threshold: 50,
            trend_threshold: 5,
        }
    }
}

/// Composite health score from resource usage and issue count.
///
/// Inputs are clamped to `[0, 100]`; the result is rounded half-to-even,
/// matching the reference implementation's tie-break.
#[allow(clippy::cast_possible_truncation)]
pub fn calculate_health_score(
    cpu_percent: f64,
    memory_percent: f64,
    disk_percent: f64,
    issue_count: usize,
    config: &ScoringConfig,
) -> i64 {
    let cpu = cpu_percent.clamp(0.0, 100.0);
    let memory = memory_percent.clamp(0.0, 100.0);
    let disk = disk_percent.clamp(0.0, 100.0);

    #[allow(clippy::cast_precision_loss)]
    let issue_score = (100.0 - issue_count as f64 * config.issue_penalty).max(0.0);

    let score = (100.0 - cpu) * config.weight_cpu
        + (100.0 - memory) * config.weight_memory
        + (100.0 - disk) * config.weight_disk
        + issue_score * config.weight_issues;

    score.round_ties_even() as i64
}

/// Trend of the score between consecutive heartbeats.
pub const fn determine_health_trend(
    current: i64,
    previous: i64,
    config: &ScoringConfig,
) -> HealthTrend {
    let delta = current - previous;
    if delta >= config.trend_threshold {
        HealthTrend::Improving
    } else if delta <= -config.trend_threshold {
        HealthTrend::Declining
    } else {
        HealthTrend::Stable
    }
}

/// Reporting category for a score. `Critical` exists only here; the node
/// status enum maps critical-range scores to `Degraded`.
pub const fn get_health_category(score: i64, config: &ScoringConfig) -> HealthCategory {
    if score >= config.healthy_threshold {
        HealthCategory::Healthy
    } else if score < config.degraded_threshold {
        HealthCategory::Critical
    } else {
        HealthCategory::Degraded
    }
}

/// Status transition recommended by a score, if any.
///
/// `Maintenance`, `Decommissioned`, and `Enrolling` are never driven by
/// scores; a target equal to the current status is a no-op.
pub fn should_transition_status(current: NodeStatus, score: i64, config: &ScoringConfig) -> Option<NodeStatus> {
    match current {
        NodeStatus::Maintenance | NodeStatus::Decommissioned | NodeStatus::Enrolling => None,
        NodeStatus::Online | NodeStatus::Degraded | NodeStatus::Offline => {
            let target = if score >= config.healthy_threshold {
                NodeStatus::Online
            } else {
                NodeStatus::Degraded
            };
            (target != current).then_some(target)
        }
    }
}
