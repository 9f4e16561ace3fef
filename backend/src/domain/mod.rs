//! Domain primitives, rules, and services.
//!
//! Purpose: hold the IMEI registration workflow independent of transport and
//! storage. Value types and pure rule functions live in their own modules;
//! services combine them with the driven ports in [`ports`] through an
//! explicit [`ServiceContext`].
//!
//! Public surface:
//! - Error / ErrorCode / FieldErrors: transport-agnostic failures.
//! - NormalizedImei / Tac and `ingest`: batch validation.
//! - Request / CaseStatus / PipelineStatus: the request lifecycle.
//! - Section / `aggregate`: review sections and dispositions.
//! - LedgerEntry / LedgerIntent: the approved-IMEI ledger.
//! - RequestService, ReviewService, AssociationService, ListGenerator and
//!   ProcessingPipeline: the driving operations.

use std::sync::Arc;

pub mod association;
pub mod association_service;
pub mod classification;
pub mod context;
pub mod disposition;
pub mod error;
mod error_mapping;
pub mod export;
pub mod imei;
pub mod ingestion;
pub mod ledger;
pub mod ports;
pub mod processing;
pub mod quota;
pub mod request;
pub mod request_service;
pub mod review_service;
pub mod search;
pub mod section;
pub mod summary;

pub use self::association::{
    AssociationContext, AssociationDecision, AssociationPolicy, AssociationRecord,
    AssociationRefusal, DeassociationRefusal, evaluate_association, window_to_close,
};
pub use self::association_service::{AssociationOutcome, AssociationService};
pub use self::classification::{
    ClassificationClient, Device, DeviceDescription, MAX_TAC_BATCH, NOT_AVAILABLE, TacGroup,
    TacMetadata, group_by_tac, radio_generation,
};
pub use self::context::{RegistryPolicy, ServiceContext};
pub use self::disposition::DispositionEngine;
pub use self::error::{Error, ErrorCode, FieldErrors};
pub use self::export::{ExportRow, ExportSettings, ListGenerator, ListReport};
pub use self::imei::{ImeiRecord, ImeiValidationError, NormalizedImei, Tac, normalize};
pub use self::ingestion::{DeclaredCounts, IngestedBatch, MAX_BATCH_IMEIS, ingest};
pub use self::ledger::{
    DeltaStatus, LedgerEntry, LedgerIntegrityError, LedgerIntent, LedgerPlan, LedgerStatus,
    ListKind, StagingPlan, plan as plan_ledger, plan_staging,
};
pub use self::processing::{ProcessingPipeline, TaskHandle};
pub use self::quota::{DeviceQuota, QuotaDebit, QuotaDefaults, QuotaExceeded};
pub use self::request::{
    Actor, CaseStatus, CloseOutcome, PipelineStatus, Request, RequestDraft, RequestKind,
    RequestTransitionError,
};
pub use self::request_service::{
    Closed, CreateRequest, RequestService, ResubmitRequest, Submitted, Upload,
};
pub use self::review_service::{ReviewService, SectionReview};
pub use self::search::{RequestFilter, RequestPage, RequestSearch};
pub use self::section::{
    IncompleteReview, Section, SectionComment, SectionStatus, SectionType, aggregate,
};
pub use self::summary::ComplianceSummary;

/// Convenient API result alias.
///
/// # Examples
/// ```
/// use imei_registry::domain::{ApiResult, Error};
///
/// fn handler() -> ApiResult<()> {
///     Err(Error::forbidden("reviewers only"))
/// }
/// assert!(handler().is_err());
/// ```
pub type ApiResult<T> = Result<T, Error>;

/// Services wired over one context.
#[derive(Clone)]
pub struct RegistryServices {
    pub requests: RequestService,
    pub reviews: ReviewService,
    pub associations: AssociationService,
    pub lists: ListGenerator,
    pub pipeline: ProcessingPipeline,
}

impl RegistryServices {
    /// Build every service over `ctx`.
    pub fn new(ctx: Arc<ServiceContext>, export: ExportSettings) -> Self {
        let disposition = DispositionEngine::new(Arc::clone(&ctx));
        let pipeline = ProcessingPipeline::new(Arc::clone(&ctx), disposition.clone());
        Self {
            requests: RequestService::new(Arc::clone(&ctx), pipeline.clone()),
            reviews: ReviewService::new(Arc::clone(&ctx), disposition),
            associations: AssociationService::new(Arc::clone(&ctx)),
            lists: ListGenerator::new(ctx, export),
            pipeline,
        }
    }
}
