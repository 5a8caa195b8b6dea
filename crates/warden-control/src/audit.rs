//! Audit sink.
//!
//! Security-relevant operations record an audit entry. The sink is
//! best-effort by contract: implementations handle (and log) their own
//! failures, and callers never fail an operation over auditing.

use async_trait::async_trait;
use tracing::info;

/// Outcome of the audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOutcome {
    Success,
    Failure,
}

impl AuditOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Best-effort audit log.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log(
        &self,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        outcome: AuditOutcome,
        details: Option<&str>,
    );
}

/// Sink that emits audit entries as structured log lines.
#[derive(Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log(
        &self,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        outcome: AuditOutcome,
        details: Option<&str>,
    ) {
        info!(
            target: "warden_audit",
            action,
            resource_type,
            resource_id,
            outcome = outcome.as_str(),
            details = details.unwrap_or(""),
            "audit"
        );
    }
}

/// Sink that records nothing (tests).
#[derive(Default)]
pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn log(
        &self,
        _action: &str,
        _resource_type: &str,
        _resource_id: &str,
        _outcome: AuditOutcome,
        _details: Option<&str>,
    ) {
    }
}
