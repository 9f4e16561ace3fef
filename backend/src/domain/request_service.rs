//! Request lifecycle service: submission, edits, documents, assignment,
//! closing, search, and dashboards.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use super::context::ServiceContext;
use super::error::{Error, FieldErrors};
use super::ingestion::{DeclaredCounts, IngestedBatch, ingest};
use super::ledger::LedgerIntent;
use super::ports::{
    AuditAction, AuditEntry, DispositionCommit, DocumentKind, StoredDocument, validate_upload,
};
use super::processing::{ProcessingPipeline, TaskHandle};
use super::request::{Actor, CaseStatus, CloseOutcome, Request, RequestDraft, RequestKind};
use super::search::{RequestPage, RequestSearch};

/// An uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub name: String,
    pub content: Vec<u8>,
}

/// Input for submitting a new request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub kind: RequestKind,
    pub submitter: Actor,
    pub device_count: usize,
    /// Required for registrations; de-registration files default to one
    /// IMEI per row.
    pub imeis_per_device: Option<usize>,
    /// Required for de-registrations.
    pub reason: Option<String>,
    pub file: Upload,
}

/// Input for replacing a request's file and counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResubmitRequest {
    pub device_count: usize,
    pub imeis_per_device: Option<usize>,
    pub file: Upload,
}

/// A request together with the handle of its processing task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub request: Request,
    pub task: TaskHandle,
}

/// Result of closing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closed {
    pub request: Request,
    pub outcome: CloseOutcome,
}

impl Closed {
    /// Informational message for the caller.
    pub fn message(&self) -> &'static str {
        match self.outcome {
            CloseOutcome::Closed => "request closed",
            CloseOutcome::AlreadyClosed => "request is already closed",
        }
    }
}

/// Request lifecycle operations.
#[derive(Clone)]
pub struct RequestService {
    ctx: Arc<ServiceContext>,
    pipeline: ProcessingPipeline,
}

impl RequestService {
    pub fn new(ctx: Arc<ServiceContext>, pipeline: ProcessingPipeline) -> Self {
        Self { ctx, pipeline }
    }

    /// Validate and persist a new request, then dispatch its processing.
    ///
    /// Validation runs before anything is stored; counts, reason, and file
    /// failures come back together in one field map.
    pub async fn create(&self, input: CreateRequest) -> Result<Submitted, Error> {
        validate_upload(DocumentKind::ImeiFile, &input.file.name, input.file.content.len())?;
        let mut fields = FieldErrors::new();
        let declared = declared_counts(
            input.kind,
            input.device_count,
            input.imeis_per_device,
            &mut fields,
        );
        if input.kind == RequestKind::DeRegistration
            && input.reason.as_deref().is_none_or(|r| r.trim().is_empty())
        {
            fields.insert(
                "reason".to_owned(),
                "de-registration requires a reason".to_owned(),
            );
        }
        let batch = ingest_into(input.kind, &input.file.content, declared, fields)?;

        let now = self.ctx.now();
        let mut request = Request::open(
            RequestDraft {
                kind: input.kind,
                submitter: input.submitter,
                device_count: declared.device_count,
                imeis_per_device: declared.imeis_per_device,
                reason: input.reason,
                file_name: input.file.name.clone(),
            },
            now,
        );
        self.store_file(&request, DocumentKind::ImeiFile, &input.file)
            .await?;
        request.begin_processing(now);
        self.ctx.requests.save(&request).await?;
        let task = self.pipeline.dispatch(&request, batch)?;

        info!(
            request_id = %request.id,
            kind = %request.kind,
            imeis = request.declared_imei_count(),
            "request created"
        );
        self.audit(&request, &request.submitter, AuditAction::Created, None);
        Ok(Submitted { request, task })
    }

    /// Read a request.
    pub async fn get(&self, id: Uuid) -> Result<Request, Error> {
        self.ctx
            .requests
            .find_by_id(&id)
            .await?
            .ok_or_else(|| Error::not_found(format!("request {id} not found")))
    }

    /// Read a request as its submitter; the report is hidden unless visible.
    pub async fn get_for_submitter(&self, id: Uuid, submitter_id: &str) -> Result<Request, Error> {
        let mut request = self.owned(id, submitter_id).await?;
        if !request.report_visible {
            request.report = None;
        }
        Ok(request)
    }

    /// Replace the file and counts of an editable request.
    pub async fn resubmit(
        &self,
        id: Uuid,
        submitter: &Actor,
        input: ResubmitRequest,
    ) -> Result<Submitted, Error> {
        let mut request = self.owned(id, &submitter.id).await?;
        request.ensure_editable()?;
        validate_upload(DocumentKind::ImeiFile, &input.file.name, input.file.content.len())?;
        let mut fields = FieldErrors::new();
        let declared = declared_counts(
            request.kind,
            input.device_count,
            input.imeis_per_device,
            &mut fields,
        );
        let batch = ingest_into(request.kind, &input.file.content, declared, fields)?;

        let previous = request.case_status;
        let now = self.ctx.now();
        request.resubmit(
            declared.device_count,
            declared.imeis_per_device,
            input.file.name.clone(),
            now,
        )?;
        self.ctx.tasks.cancel(&request.id);
        self.store_file(&request, DocumentKind::ImeiFile, &input.file)
            .await?;
        request.begin_processing(now);
        self.ctx.requests.save(&request).await?;
        let task = self.pipeline.dispatch(&request, batch)?;

        self.audit_transition(&request, submitter, AuditAction::Updated, previous);
        Ok(Submitted { request, task })
    }

    /// Change the reason of an editable request.
    pub async fn update_reason(
        &self,
        id: Uuid,
        submitter: &Actor,
        reason: Option<String>,
    ) -> Result<Request, Error> {
        let mut request = self.owned(id, &submitter.id).await?;
        if request.kind == RequestKind::DeRegistration
            && reason.as_deref().is_none_or(|r| r.trim().is_empty())
        {
            let mut fields = FieldErrors::new();
            fields.insert(
                "reason".to_owned(),
                "de-registration requires a reason".to_owned(),
            );
            return Err(Error::validation(fields));
        }
        request.update_reason(reason, self.ctx.now())?;
        self.ctx.requests.save(&request).await?;
        self.audit(&request, submitter, AuditAction::Updated, Some("reason changed"));
        Ok(request)
    }

    /// Attach supporting documents.
    ///
    /// Every upload is checked before any is stored.
    pub async fn attach_documents(
        &self,
        id: Uuid,
        submitter: &Actor,
        documents: Vec<Upload>,
    ) -> Result<(Request, Vec<StoredDocument>), Error> {
        let mut request = self.owned(id, &submitter.id).await?;
        if documents.is_empty() {
            let mut fields = FieldErrors::new();
            fields.insert("documents".to_owned(), "attach at least one document".to_owned());
            return Err(Error::validation(fields));
        }
        for upload in &documents {
            validate_upload(DocumentKind::Supporting, &upload.name, upload.content.len())?;
        }
        let previous = request.case_status;
        request.attach_documents(self.ctx.now())?;

        let mut stored = Vec::with_capacity(documents.len());
        for upload in &documents {
            stored.push(
                self.store_file(&request, DocumentKind::Supporting, upload)
                    .await?,
            );
        }
        self.ctx.requests.save(&request).await?;
        self.audit_transition(&request, submitter, AuditAction::DocumentsAttached, previous);
        Ok((request, stored))
    }

    /// Close a request. Closing a closed request is informational.
    ///
    /// An undecided registration releases its staged ledger entries in the
    /// same transaction, so its IMEIs can be registered again.
    pub async fn close(&self, id: Uuid, actor: &Actor) -> Result<Closed, Error> {
        let mut request = self.get(id).await?;
        let previous = request.case_status;
        let outcome = request.close(self.ctx.now());
        if outcome == CloseOutcome::Closed {
            self.ctx.tasks.cancel(&request.id);
            let ledger = (request.kind == RequestKind::Registration && !previous.is_terminal())
                .then_some(LedgerIntent::ReverseRegistration {
                    request_id: request.id,
                });
            self.ctx
                .requests
                .commit_disposition(&DispositionCommit {
                    request: request.clone(),
                    expected_status: previous,
                    ledger,
                    quota: None,
                })
                .await?;
            self.audit_transition(&request, actor, AuditAction::Closed, previous);
        }
        Ok(Closed { request, outcome })
    }

    /// Assign a reviewer.
    pub async fn assign(&self, id: Uuid, reviewer: Actor) -> Result<Request, Error> {
        let mut request = self.get(id).await?;
        let previous = request.case_status;
        request.assign(reviewer.clone(), self.ctx.now())?;
        self.ctx.requests.save(&request).await?;
        self.audit_transition(&request, &reviewer, AuditAction::Assigned, previous);
        Ok(request)
    }

    /// Release the assigned reviewer.
    pub async fn unassign(&self, id: Uuid, reviewer: &Actor) -> Result<Request, Error> {
        let mut request = self.get(id).await?;
        let previous = request.case_status;
        request.unassign(&reviewer.id, self.ctx.now())?;
        self.ctx.requests.save(&request).await?;
        self.audit_transition(&request, reviewer, AuditAction::Unassigned, previous);
        Ok(request)
    }

    /// Show or hide the compliance report to the submitter.
    pub async fn set_report_visibility(
        &self,
        id: Uuid,
        reviewer: &Actor,
        visible: bool,
    ) -> Result<Request, Error> {
        let mut request = self.get(id).await?;
        request.ensure_reviewer(&reviewer.id)?;
        request.report_visible = visible;
        request.updated_at = self.ctx.now();
        self.ctx.requests.save(&request).await?;
        let detail = if visible { "report shown" } else { "report hidden" };
        self.audit(&request, reviewer, AuditAction::ReportVisibilityChanged, Some(detail));
        Ok(request)
    }

    /// Re-run processing after a failure.
    pub async fn restart(&self, id: Uuid, actor: &Actor) -> Result<TaskHandle, Error> {
        self.pipeline.restart(id, actor).await
    }

    /// Paged search.
    pub async fn search(&self, search: &RequestSearch) -> Result<RequestPage, Error> {
        search.validate().map_err(Error::validation)?;
        Ok(self.ctx.requests.search(search).await?)
    }

    /// Per-status counts for a submitter; every status is present.
    pub async fn dashboard(&self, submitter_id: &str) -> Result<BTreeMap<CaseStatus, i64>, Error> {
        let mut counts = self.ctx.requests.count_by_status(submitter_id).await?;
        for status in CaseStatus::ALL {
            counts.entry(status).or_insert(0);
        }
        Ok(counts)
    }

    /// Names of the files stored for a request.
    ///
    /// Submitters only see their own requests; `None` reads any request.
    pub async fn documents(&self, id: Uuid, submitter_id: Option<&str>) -> Result<Vec<String>, Error> {
        let request = match submitter_id {
            Some(submitter_id) => self.owned(id, submitter_id).await?,
            None => self.get(id).await?,
        };
        Ok(self.ctx.documents.list(&request.tracking_id).await?)
    }

    async fn owned(&self, id: Uuid, submitter_id: &str) -> Result<Request, Error> {
        let request = self.get(id).await?;
        if request.submitter.id != submitter_id {
            return Err(Error::not_found(format!("request {id} not found")));
        }
        Ok(request)
    }

    async fn store_file(
        &self,
        request: &Request,
        kind: DocumentKind,
        upload: &Upload,
    ) -> Result<StoredDocument, Error> {
        Ok(self
            .ctx
            .documents
            .store(&request.tracking_id, kind, &upload.name, &upload.content)
            .await?)
    }

    fn audit(&self, request: &Request, actor: &Actor, action: AuditAction, detail: Option<&str>) {
        self.ctx.audit(AuditEntry {
            actor: actor.clone(),
            action,
            request_id: Some(request.id),
            tracking_id: Some(request.tracking_id),
            from_status: None,
            to_status: Some(request.case_status),
            detail: detail.map(str::to_owned),
            at: request.updated_at,
        });
    }

    fn audit_transition(
        &self,
        request: &Request,
        actor: &Actor,
        action: AuditAction,
        previous: CaseStatus,
    ) {
        self.ctx.audit(AuditEntry {
            actor: actor.clone(),
            action,
            request_id: Some(request.id),
            tracking_id: Some(request.tracking_id),
            from_status: Some(previous),
            to_status: Some(request.case_status),
            detail: None,
            at: request.updated_at,
        });
    }
}

/// Check the declared counts, recording failures in `fields`.
///
/// Invalid counts come back as zero so the file checks can still run.
fn declared_counts(
    kind: RequestKind,
    device_count: usize,
    imeis_per_device: Option<usize>,
    fields: &mut FieldErrors,
) -> DeclaredCounts {
    if device_count == 0 {
        fields.insert(
            "device_count".to_owned(),
            "device count must be at least 1".to_owned(),
        );
    }
    let imeis_per_device = match (kind, imeis_per_device) {
        (_, Some(0)) => {
            fields.insert(
                "imei_per_device".to_owned(),
                "IMEIs per device must be at least 1".to_owned(),
            );
            0
        }
        (_, Some(count)) => count,
        (RequestKind::DeRegistration, None) => 1,
        (RequestKind::Registration, None) => {
            fields.insert(
                "imei_per_device".to_owned(),
                "IMEIs per device is required".to_owned(),
            );
            0
        }
    };
    DeclaredCounts {
        device_count,
        imeis_per_device,
    }
}

/// Ingest `file` and report its failures together with `fields`.
///
/// A message already recorded for a key wins over the file check for the
/// same key.
fn ingest_into(
    kind: RequestKind,
    file: &[u8],
    declared: DeclaredCounts,
    mut fields: FieldErrors,
) -> Result<IngestedBatch, Error> {
    match ingest(kind, file, declared) {
        Ok(batch) if fields.is_empty() => Ok(batch),
        Ok(_) => Err(Error::validation(fields)),
        Err(file_errors) => {
            for (key, message) in file_errors {
                fields.entry(key).or_insert(message);
            }
            Err(Error::validation(fields))
        }
    }
}

#[cfg(test)]
#[path = "request_service_tests.rs"]
mod tests;
