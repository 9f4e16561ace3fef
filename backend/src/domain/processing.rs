//! Background processing and compliance summarisation of request files.
//!
//! One keyed task per request runs classification, ledger staging, and the
//! compliance summary in order. The task body records progress as it goes;
//! its completion callback handles failures, timeouts, and automated
//! decisions.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use uuid::Uuid;

use super::classification::ClassificationClient;
use super::context::ServiceContext;
use super::disposition::DispositionEngine;
use super::error::Error;
use super::imei::NormalizedImei;
use super::ingestion::{DeclaredCounts, IngestedBatch, ingest};
use super::ports::{AuditAction, AuditEntry, ComplianceQuery, TaskJob, TaskOutcome};
use super::request::{Actor, PipelineStatus, Request, RequestKind};
use super::section::SectionStatus;
use super::summary::ComplianceSummary;

/// Handle to a dispatched processing task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskHandle {
    /// Task key; equal to the request id.
    pub key: Uuid,
}

/// Drives request files through classification and summarisation.
#[derive(Clone)]
pub struct ProcessingPipeline {
    ctx: Arc<ServiceContext>,
    disposition: DispositionEngine,
}

impl ProcessingPipeline {
    pub fn new(ctx: Arc<ServiceContext>, disposition: DispositionEngine) -> Self {
        Self { ctx, disposition }
    }

    /// Queue processing for a request whose pipelines are already marked
    /// `Processing`.
    pub fn dispatch(&self, request: &Request, batch: IngestedBatch) -> Result<TaskHandle, Error> {
        let key = request.id;
        let request_id = request.id;
        let ctx = Arc::clone(&self.ctx);
        let callback_pipeline = self.clone();

        self.ctx.tasks.submit(TaskJob {
            key,
            timeout: self.ctx.policy.summary_timeout,
            work: Box::pin(async move {
                run(ctx, request_id, batch)
                    .await
                    .map_err(|err| err.to_string())
            }),
            on_complete: Box::new(move |outcome| {
                Box::pin(async move { callback_pipeline.complete(request_id, outcome).await })
            }),
        })?;
        info!(request_id = %request_id, "request processing dispatched");
        Ok(TaskHandle { key })
    }

    /// Wait for a dispatched task and its completion callback.
    pub async fn wait(&self, handle: TaskHandle, timeout: Duration) -> Result<(), Error> {
        self.ctx.tasks.wait(&handle.key, timeout).await?;
        Ok(())
    }

    /// Re-run processing for a request whose pipeline failed.
    ///
    /// The stored file is read back and re-ingested; any running task for the
    /// request is cancelled first.
    pub async fn restart(&self, request_id: Uuid, actor: &Actor) -> Result<TaskHandle, Error> {
        let mut request = self
            .ctx
            .requests
            .find_by_id(&request_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("request {request_id} not found")))?;
        request.ensure_restartable()?;

        let file = self
            .ctx
            .documents
            .read(&request.tracking_id, &request.file_name)
            .await?;
        let batch = ingest(
            request.kind,
            &file,
            DeclaredCounts {
                device_count: request.device_count,
                imeis_per_device: request.imeis_per_device,
            },
        )
        .map_err(Error::validation)?;

        if self.ctx.tasks.cancel(&request.id) {
            warn!(request_id = %request.id, "discarded running task before restart");
        }
        let now = self.ctx.now();
        request.begin_processing(now);
        self.ctx.requests.save(&request).await?;
        let handle = self.dispatch(&request, batch)?;

        self.ctx.audit(AuditEntry {
            actor: actor.clone(),
            action: AuditAction::ProcessingRestarted,
            request_id: Some(request.id),
            tracking_id: Some(request.tracking_id),
            from_status: Some(request.case_status),
            to_status: Some(request.case_status),
            detail: None,
            at: now,
        });
        Ok(handle)
    }

    async fn complete(&self, request_id: Uuid, outcome: TaskOutcome) {
        let result = match outcome {
            TaskOutcome::Succeeded => self.settle_automatically(request_id).await,
            TaskOutcome::Failed { message } => {
                error!(request_id = %request_id, %message, "request processing failed");
                self.record_failure(request_id).await
            }
            TaskOutcome::TimedOut => {
                error!(request_id = %request_id, "request processing timed out");
                self.record_failure(request_id).await
            }
        };
        if let Err(err) = result {
            error!(request_id = %request_id, error = %err, "request completion handling failed");
        }
    }

    async fn record_failure(&self, request_id: Uuid) -> Result<(), Error> {
        let Some(mut request) = self.ctx.requests.find_by_id(&request_id).await? else {
            return Ok(());
        };
        let now = self.ctx.now();
        if request.processing_status == PipelineStatus::Processed {
            request.fail_report(now);
        } else {
            request.fail_processing(now);
        }
        self.ctx.requests.save(&request).await?;
        Ok(())
    }

    async fn settle_automatically(&self, request_id: Uuid) -> Result<(), Error> {
        if !self.ctx.policy.automated_decision {
            return Ok(());
        }
        let Some(request) = self.ctx.requests.find_by_id(&request_id).await? else {
            return Ok(());
        };
        let outcome = match request.summary {
            Some(summary) if summary.is_clean() => SectionStatus::Approved,
            _ => SectionStatus::Rejected,
        };
        let settled = self
            .disposition
            .dispose(request, outcome, &Actor::automated())
            .await?;
        info!(
            request_id = %settled.id,
            status = %settled.case_status,
            "request settled by automated decision"
        );
        Ok(())
    }
}

async fn run(ctx: Arc<ServiceContext>, request_id: Uuid, batch: IngestedBatch) -> Result<(), Error> {
    let request = load(&ctx, request_id).await?;
    let imeis = batch.imeis();

    let mut devices = ClassificationClient::new(Arc::clone(&ctx.device_database))
        .classify(request_id, &batch)
        .await;
    let held = match request.kind {
        RequestKind::Registration => ctx.ledger.stage(&request_id, &imeis, ctx.now()).await?,
        RequestKind::DeRegistration => Default::default(),
    };
    for record in devices.iter_mut().flat_map(|device| device.imeis.iter_mut()) {
        record.duplicate = held.contains(&record.normalized);
    }
    ctx.requests.replace_devices(&request_id, &devices).await?;

    let mut request = load(&ctx, request_id).await?;
    request.complete_processing(ctx.now());
    ctx.requests.save(&request).await?;
    info!(request_id = %request_id, devices = devices.len(), "request file processed");

    let summary = summarise(&ctx, &request, imeis).await?;
    let mut request = load(&ctx, request_id).await?;
    let (summary, report) = summary;
    request.complete_report(summary, report, ctx.now());
    ctx.requests.save(&request).await?;
    info!(request_id = %request_id, clean = summary.is_clean(), "compliance summary stored");
    Ok(())
}

async fn summarise(
    ctx: &ServiceContext,
    request: &Request,
    imeis: Vec<NormalizedImei>,
) -> Result<(ComplianceSummary, Option<String>), Error> {
    let duplicate = match request.kind {
        RequestKind::Registration => ctx.ledger.held_elsewhere(&request.id, &imeis).await?.len(),
        RequestKind::DeRegistration => 0,
    };
    let total_imeis = imeis.len();
    let verdict = ctx
        .compliance
        .check(&ComplianceQuery {
            correlation_id: request.tracking_id,
            imeis,
        })
        .await
        .map_err(|err| Error::service_unavailable(err.to_string()))?;
    Ok((
        ComplianceSummary {
            total_imeis,
            non_compliant: verdict.non_compliant,
            stolen: verdict.stolen,
            duplicate,
        },
        verdict.report,
    ))
}

async fn load(ctx: &ServiceContext, request_id: Uuid) -> Result<Request, Error> {
    ctx.requests
        .find_by_id(&request_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("request {request_id} not found")))
}

#[cfg(test)]
#[path = "processing_tests.rs"]
mod tests;
