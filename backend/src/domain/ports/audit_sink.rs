//! Driven port for structured audit entries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Actor, CaseStatus};

/// Audited request actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    DocumentsAttached,
    Assigned,
    Unassigned,
    SectionReviewed,
    Disposed,
    Closed,
    ProcessingRestarted,
    ReportVisibilityChanged,
    Associated,
    Deassociated,
}

/// One audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub actor: Actor,
    pub action: AuditAction,
    pub request_id: Option<Uuid>,
    pub tracking_id: Option<Uuid>,
    pub from_status: Option<CaseStatus>,
    pub to_status: Option<CaseStatus>,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

/// Port for recording audit entries.
///
/// Recording is infallible from the caller's point of view; adapters report
/// their own failures.
#[cfg_attr(test, mockall::automock)]
pub trait AuditSink: Send + Sync {
    /// Record one entry.
    fn record(&self, entry: &AuditEntry);
}

/// Fixture implementation that drops every entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureAuditSink;

impl AuditSink for FixtureAuditSink {
    fn record(&self, _entry: &AuditEntry) {}
}
