//! Audit sink adapters.
//!
//! The default sink writes every entry as a structured `tracing` event on
//! the `audit` target so log shipping can route it separately.

use tracing::info;

use crate::domain::ports::{AuditEntry, AuditSink};

/// Audit sink emitting `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    pub fn new() -> Self {
        Self
    }
}

/// Snake-case label of an audit action, as serialised.
fn action_label(entry: &AuditEntry) -> String {
    serde_json::to_value(entry.action)
        .ok()
        .and_then(|value| value.as_str().map(str::to_owned))
        .unwrap_or_else(|| format!("{:?}", entry.action))
}

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: &AuditEntry) {
        info!(
            target: "audit",
            actor_id = %entry.actor.id,
            actor_name = %entry.actor.name,
            action = %action_label(entry),
            request_id = ?entry.request_id,
            tracking_id = ?entry.tracking_id,
            from_status = ?entry.from_status,
            to_status = ?entry.to_status,
            detail = entry.detail.as_deref().unwrap_or(""),
            at = %entry.at.to_rfc3339(),
            "audit"
        );
    }
}
