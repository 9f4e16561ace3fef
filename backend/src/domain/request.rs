//! Registration and de-registration request lifecycle.
//!
//! ```text
//! NewRequest ─▶ AwaitingDocuments ─▶ PendingReview ─▶ InReview ─┬─▶ InformationRequested ─▶ PendingReview
//!                                          ▲              │     ├─▶ Approved
//!                                          └── unassign ──┘     └─▶ Rejected
//!
//! any non-closed state ─▶ Closed
//! ```
//!
//! Two pipeline sub-states run beside the case status: `processing_status`
//! tracks file parsing and classification, `report_status` tracks the
//! compliance summary. Review is gated on `report_status == Processed`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::summary::ComplianceSummary;

/// Whether a request adds IMEIs to the ledger or removes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Register new devices.
    Registration,
    /// De-register previously approved devices.
    DeRegistration,
}

impl RequestKind {
    /// Stable storage label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::DeRegistration => "de_registration",
        }
    }

    /// Parse a storage label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "registration" => Some(Self::Registration),
            "de_registration" => Some(Self::DeRegistration),
            _ => None,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall case lifecycle status. Discriminants are the stored codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    /// Created; the file pipeline has not finished.
    NewRequest = 1,
    /// Processed, waiting for supporting documents.
    AwaitingDocuments = 2,
    /// Queued for a reviewer.
    PendingReview = 3,
    /// Assigned to a reviewer.
    InReview = 4,
    /// Returned to the submitter for more information.
    InformationRequested = 5,
    /// Final: the IMEIs were accepted.
    Approved = 6,
    /// Final: the IMEIs were refused.
    Rejected = 7,
    /// Withdrawn by the submitter.
    Closed = 8,
}

impl CaseStatus {
    /// Every status in code order.
    pub const ALL: [Self; 8] = [
        Self::NewRequest,
        Self::AwaitingDocuments,
        Self::PendingReview,
        Self::InReview,
        Self::InformationRequested,
        Self::Approved,
        Self::Rejected,
        Self::Closed,
    ];

    /// Stored numeric code.
    pub fn code(self) -> i16 {
        self as i16
    }

    /// Look up a status by stored code.
    pub fn from_code(code: i16) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }

    /// Human-readable label used in notifications and audit entries.
    pub fn label(self) -> &'static str {
        match self {
            Self::NewRequest => "New Request",
            Self::AwaitingDocuments => "Awaiting Documents",
            Self::PendingReview => "Pending Review",
            Self::InReview => "In Review",
            Self::InformationRequested => "Information Requested",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::Closed => "Closed",
        }
    }

    /// Whether the submitter may still change the file, counts, or reason.
    pub fn is_editable(self) -> bool {
        !matches!(
            self,
            Self::InReview | Self::Approved | Self::Rejected | Self::Closed
        )
    }

    /// Whether the request reached a final disposition.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Closed)
    }

    fn allows(self, next: Self) -> bool {
        use CaseStatus::{
            Approved, AwaitingDocuments, Closed, InReview, InformationRequested, NewRequest,
            PendingReview, Rejected,
        };
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (NewRequest, AwaitingDocuments)
            | (AwaitingDocuments | InformationRequested, PendingReview)
            | (PendingReview, InReview)
            | (InReview, PendingReview | InformationRequested | Approved | Rejected) => true,
            // Automated decisions settle a request without a reviewer.
            (NewRequest | AwaitingDocuments | PendingReview, Approved | Rejected) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Progress of an asynchronous pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Not started.
    New,
    /// Running.
    Processing,
    /// Finished successfully.
    Processed,
    /// Finished with an error; eligible for restart.
    Failed,
}

impl PipelineStatus {
    /// Stable storage label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }

    /// Parse a storage label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "new" => Some(Self::New),
            "processing" => Some(Self::Processing),
            "processed" => Some(Self::Processed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Person (or process) acting on a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Stable identity issued by the identity provider.
    pub id: String,
    /// Display name recorded for audit.
    pub name: String,
}

impl Actor {
    /// Identity used for decisions taken without a human reviewer.
    pub const AUTOMATED_ID: &'static str = "automated-process";

    /// Build an actor.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// The fixed actor recorded for automated decisions.
    pub fn automated() -> Self {
        Self::new(Self::AUTOMATED_ID, "Automated Process")
    }
}

/// Errors raised by request lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestTransitionError {
    /// The lifecycle graph has no edge between the two states.
    #[error("request cannot move from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: CaseStatus,
        /// Requested status.
        to: CaseStatus,
    },
    /// The request has a reviewer already.
    #[error("request is already assigned to {reviewer}")]
    AlreadyAssigned {
        /// Reviewer currently holding the request.
        reviewer: String,
    },
    /// The caller is not the assigned reviewer.
    #[error("reviewer {reviewer_id} is not assigned to this request")]
    NotAssignedReviewer {
        /// Reviewer who attempted the action.
        reviewer_id: String,
    },
    /// The compliance report has not been produced yet.
    #[error("request report is not processed yet")]
    ReportNotReady,
    /// The file pipeline has not finished.
    #[error("request is still being processed")]
    ProcessingNotComplete,
    /// The request can no longer be edited.
    #[error("request in status {status} cannot be updated")]
    NotEditable {
        /// Status that forbids the edit.
        status: CaseStatus,
    },
    /// Restart requested while nothing failed.
    #[error("request processing has not failed")]
    NotFailed,
}

/// Result of closing a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The request moved to `Closed`.
    Closed,
    /// The request was already closed; nothing changed.
    AlreadyClosed,
}

/// Inputs for a new request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDraft {
    /// Registration or de-registration.
    pub kind: RequestKind,
    /// Who opened the request.
    pub submitter: Actor,
    /// Declared number of devices in the file.
    pub device_count: usize,
    /// Declared number of IMEIs on each device.
    pub imeis_per_device: usize,
    /// De-registration reason; `None` for registrations.
    pub reason: Option<String>,
    /// Name of the uploaded IMEI file.
    pub file_name: String,
}

/// A registration or de-registration case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Primary key.
    pub id: Uuid,
    /// Identifier shared with the submitter for follow-up.
    pub tracking_id: Uuid,
    /// Registration or de-registration.
    pub kind: RequestKind,
    /// Who opened the request.
    pub submitter: Actor,
    /// Assigned reviewer, if any.
    pub reviewer: Option<Actor>,
    /// Case lifecycle position.
    pub case_status: CaseStatus,
    /// File processing pipeline state.
    pub processing_status: PipelineStatus,
    /// Compliance summary pipeline state.
    pub report_status: PipelineStatus,
    /// Declared number of devices.
    pub device_count: usize,
    /// Declared number of IMEIs on each device.
    pub imeis_per_device: usize,
    /// De-registration reason; `None` for registrations.
    pub reason: Option<String>,
    /// Name of the uploaded IMEI file.
    pub file_name: String,
    /// Compliance counts once the summary ran.
    pub summary: Option<ComplianceSummary>,
    /// Storage name of the compliance report.
    pub report: Option<String>,
    /// Whether the submitter may download the report.
    pub report_visible: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last change time.
    pub updated_at: DateTime<Utc>,
}

impl Request {
    /// Open a new request in `NewRequest` with both pipelines at `New`.
    pub fn open(draft: RequestDraft, now: DateTime<Utc>) -> Self {
        let RequestDraft {
            kind,
            submitter,
            device_count,
            imeis_per_device,
            reason,
            file_name,
        } = draft;
        Self {
            id: Uuid::new_v4(),
            tracking_id: Uuid::new_v4(),
            kind,
            submitter,
            reviewer: None,
            case_status: CaseStatus::NewRequest,
            processing_status: PipelineStatus::New,
            report_status: PipelineStatus::New,
            device_count,
            imeis_per_device,
            reason,
            file_name,
            summary: None,
            report: None,
            report_visible: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(
        &mut self,
        next: CaseStatus,
        now: DateTime<Utc>,
    ) -> Result<(), RequestTransitionError> {
        if !self.case_status.allows(next) {
            return Err(RequestTransitionError::InvalidTransition {
                from: self.case_status,
                to: next,
            });
        }
        self.case_status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Reject edits once review has started or the case is settled.
    pub fn ensure_editable(&self) -> Result<(), RequestTransitionError> {
        if self.case_status.is_editable() {
            Ok(())
        } else {
            Err(RequestTransitionError::NotEditable {
                status: self.case_status,
            })
        }
    }

    /// Apply a resubmitted file or changed counts.
    ///
    /// Both pipelines restart from `New`. A request answering an information
    /// request returns to the review queue.
    pub fn resubmit(
        &mut self,
        device_count: usize,
        imeis_per_device: usize,
        file_name: String,
        now: DateTime<Utc>,
    ) -> Result<(), RequestTransitionError> {
        self.ensure_editable()?;
        self.device_count = device_count;
        self.imeis_per_device = imeis_per_device;
        self.file_name = file_name;
        self.reset_pipelines(now);
        if self.case_status == CaseStatus::InformationRequested {
            self.transition(CaseStatus::PendingReview, now)?;
        }
        Ok(())
    }

    /// Change the de-registration reason.
    pub fn update_reason(
        &mut self,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), RequestTransitionError> {
        self.ensure_editable()?;
        self.reason = reason;
        self.updated_at = now;
        Ok(())
    }

    /// Record that supporting documents were attached.
    pub fn attach_documents(&mut self, now: DateTime<Utc>) -> Result<(), RequestTransitionError> {
        self.ensure_editable()?;
        match self.case_status {
            CaseStatus::NewRequest => Err(RequestTransitionError::ProcessingNotComplete),
            CaseStatus::AwaitingDocuments | CaseStatus::InformationRequested => {
                self.transition(CaseStatus::PendingReview, now)
            }
            _ => {
                self.updated_at = now;
                Ok(())
            }
        }
    }

    fn reset_pipelines(&mut self, now: DateTime<Utc>) {
        self.processing_status = PipelineStatus::New;
        self.report_status = PipelineStatus::New;
        self.summary = None;
        self.report = None;
        self.updated_at = now;
    }

    /// Mark both pipelines as running.
    pub fn begin_processing(&mut self, now: DateTime<Utc>) {
        self.processing_status = PipelineStatus::Processing;
        self.report_status = PipelineStatus::Processing;
        self.summary = None;
        self.report = None;
        self.updated_at = now;
    }

    /// File processing and classification finished.
    pub fn complete_processing(&mut self, now: DateTime<Utc>) {
        self.processing_status = PipelineStatus::Processed;
        if self.case_status == CaseStatus::NewRequest {
            self.case_status = CaseStatus::AwaitingDocuments;
        }
        self.updated_at = now;
    }

    /// File processing failed; the summary never ran.
    pub fn fail_processing(&mut self, now: DateTime<Utc>) {
        self.processing_status = PipelineStatus::Failed;
        self.report_status = PipelineStatus::Failed;
        self.updated_at = now;
    }

    /// The compliance summary was produced.
    pub fn complete_report(
        &mut self,
        summary: ComplianceSummary,
        report: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.report_status = PipelineStatus::Processed;
        self.summary = Some(summary);
        self.report = report;
        self.updated_at = now;
    }

    /// The compliance summary failed; file processing is left untouched.
    pub fn fail_report(&mut self, now: DateTime<Utc>) {
        self.report_status = PipelineStatus::Failed;
        self.updated_at = now;
    }

    /// Whether a manual restart is applicable.
    pub fn ensure_restartable(&self) -> Result<(), RequestTransitionError> {
        self.ensure_editable()?;
        if self.processing_status == PipelineStatus::Failed
            || self.report_status == PipelineStatus::Failed
        {
            Ok(())
        } else {
            Err(RequestTransitionError::NotFailed)
        }
    }

    /// Assign a reviewer (`PendingReview` → `InReview`).
    pub fn assign(
        &mut self,
        reviewer: Actor,
        now: DateTime<Utc>,
    ) -> Result<(), RequestTransitionError> {
        if let Some(current) = &self.reviewer {
            return Err(RequestTransitionError::AlreadyAssigned {
                reviewer: current.name.clone(),
            });
        }
        if self.report_status != PipelineStatus::Processed {
            return Err(RequestTransitionError::ReportNotReady);
        }
        self.transition(CaseStatus::InReview, now)?;
        self.reviewer = Some(reviewer);
        Ok(())
    }

    /// Remove the reviewer (`InReview` → `PendingReview`).
    pub fn unassign(
        &mut self,
        reviewer_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RequestTransitionError> {
        self.ensure_reviewer(reviewer_id)?;
        self.transition(CaseStatus::PendingReview, now)?;
        self.reviewer = None;
        Ok(())
    }

    /// Verify `reviewer_id` is the assigned reviewer.
    pub fn ensure_reviewer(&self, reviewer_id: &str) -> Result<(), RequestTransitionError> {
        match &self.reviewer {
            Some(reviewer) if reviewer.id == reviewer_id => Ok(()),
            _ => Err(RequestTransitionError::NotAssignedReviewer {
                reviewer_id: reviewer_id.to_owned(),
            }),
        }
    }

    /// Verify the request can take section or final reviews from `reviewer_id`.
    pub fn ensure_reviewable_by(&self, reviewer_id: &str) -> Result<(), RequestTransitionError> {
        self.ensure_reviewer(reviewer_id)?;
        if self.case_status != CaseStatus::InReview {
            return Err(RequestTransitionError::InvalidTransition {
                from: self.case_status,
                to: CaseStatus::InReview,
            });
        }
        if self.report_status != PipelineStatus::Processed {
            return Err(RequestTransitionError::ReportNotReady);
        }
        Ok(())
    }

    /// Settle the case with a review outcome.
    ///
    /// Requesting information releases the reviewer so the resubmitted
    /// request can be picked up again.
    pub fn settle(
        &mut self,
        status: CaseStatus,
        now: DateTime<Utc>,
    ) -> Result<(), RequestTransitionError> {
        self.transition(status, now)?;
        if status == CaseStatus::InformationRequested {
            self.reviewer = None;
        }
        Ok(())
    }

    /// Close the request. Closing twice is informational, not an error.
    pub fn close(&mut self, now: DateTime<Utc>) -> CloseOutcome {
        if self.case_status == CaseStatus::Closed {
            return CloseOutcome::AlreadyClosed;
        }
        self.case_status = CaseStatus::Closed;
        self.updated_at = now;
        CloseOutcome::Closed
    }

    /// Number of normalised IMEIs the request declares.
    pub fn declared_imei_count(&self) -> usize {
        self.device_count.saturating_mul(self.imeis_per_device)
    }
}
