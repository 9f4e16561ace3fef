//! Fully wired in-memory registry for service and workflow tests.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use super::clock::MutableClock;
use super::doubles::{
    InMemoryDocumentStore, InMemoryListWriter, RecordingAuditSink, RecordingNotificationSink,
    ScriptedComplianceChecker, StaticDeviceDatabase,
};
use super::registry::InMemoryRegistry;
use crate::domain::ports::RequestRepository;
use crate::domain::{
    Actor, CreateRequest, Error, ExportSettings, NormalizedImei, RegistryPolicy,
    RegistryServices, Request, RequestKind, SectionReview, SectionType, ServiceContext,
    Submitted, Upload,
};
use crate::outbound::queue::TokioTaskQueue;

const WAIT: Duration = Duration::from_secs(5);

fn must<T, E: Display>(result: Result<T, E>, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(error) => panic!("{context}: {error}"),
    }
}

/// Parse a test IMEI.
pub fn imei(raw: &str) -> NormalizedImei {
    must(NormalizedImei::parse(raw), "test IMEI")
}

/// `count` fourteen-digit IMEIs sharing `tac`, numbered from `start`.
pub fn sequential_imeis(tac: &str, start: u32, count: u32) -> Vec<String> {
    (start..start + count)
        .map(|serial| format!("{tac}{serial:06}"))
        .collect()
}

/// Encode rows as a comma-separated upload.
pub fn csv_upload(name: &str, rows: &[Vec<String>]) -> Upload {
    let content = rows
        .iter()
        .map(|row| row.join(","))
        .collect::<Vec<_>>()
        .join("\n");
    Upload {
        name: name.to_owned(),
        content: content.into_bytes(),
    }
}

/// Services over in-memory adapters and a Tokio task queue.
pub struct RegistryHarness {
    pub clock: Arc<MutableClock>,
    pub registry: InMemoryRegistry,
    pub device_database: Arc<StaticDeviceDatabase>,
    pub compliance: Arc<ScriptedComplianceChecker>,
    pub notifications: Arc<RecordingNotificationSink>,
    pub audit: Arc<RecordingAuditSink>,
    pub documents: Arc<InMemoryDocumentStore>,
    pub lists: Arc<InMemoryListWriter>,
    pub tasks: Arc<TokioTaskQueue>,
    pub ctx: Arc<ServiceContext>,
    pub services: RegistryServices,
}

impl Default for RegistryHarness {
    fn default() -> Self {
        Self::with_policy(RegistryPolicy::default())
    }
}

impl RegistryHarness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a harness; must run inside a Tokio runtime before dispatching.
    pub fn with_policy(policy: RegistryPolicy) -> Self {
        let start = must(
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
                .single()
                .ok_or("ambiguous start time"),
            "harness clock",
        );
        let clock = Arc::new(MutableClock::new(start));
        let registry = InMemoryRegistry::new();
        let device_database = Arc::new(StaticDeviceDatabase::new());
        let compliance = Arc::new(ScriptedComplianceChecker::new());
        let notifications = Arc::new(RecordingNotificationSink::new());
        let audit = Arc::new(RecordingAuditSink::new());
        let documents = Arc::new(InMemoryDocumentStore::new());
        let lists = Arc::new(InMemoryListWriter::new());
        let tasks = Arc::new(TokioTaskQueue::new());

        let ctx = Arc::new(ServiceContext {
            requests: Arc::new(registry.clone()),
            sections: Arc::new(registry.clone()),
            ledger: Arc::new(registry.clone()),
            quotas: Arc::new(registry.clone()),
            associations: Arc::new(registry.clone()),
            device_database: device_database.clone(),
            compliance: compliance.clone(),
            notifications: notifications.clone(),
            audit: audit.clone(),
            documents: documents.clone(),
            tasks: tasks.clone(),
            lists: lists.clone(),
            clock: clock.clone(),
            policy,
        });
        let services = RegistryServices::new(
            Arc::clone(&ctx),
            ExportSettings {
                workers: 2,
                batches: 3,
            },
        );

        Self {
            clock,
            registry,
            device_database,
            compliance,
            notifications,
            audit,
            documents,
            lists,
            tasks,
            ctx,
            services,
        }
    }

    /// A user acting as submitter or reviewer.
    pub fn actor(id: &str) -> Actor {
        Actor::new(id, format!("User {id}"))
    }

    /// Submit a request built from `rows` (one row per device).
    pub async fn submit(
        &self,
        kind: RequestKind,
        submitter: &Actor,
        rows: &[Vec<String>],
    ) -> Result<Submitted, Error> {
        self.services
            .requests
            .create(CreateRequest {
                kind,
                submitter: submitter.clone(),
                device_count: rows.len(),
                imeis_per_device: rows.first().map(Vec::len),
                reason: match kind {
                    RequestKind::Registration => None,
                    RequestKind::DeRegistration => Some("devices retired".to_owned()),
                },
                file: csv_upload("imeis.csv", rows),
            })
            .await
    }

    /// Wait for the submission's processing and return the stored request.
    pub async fn settle(&self, submitted: &Submitted) -> Request {
        must(
            self.services.pipeline.wait(submitted.task, WAIT).await,
            "processing wait",
        );
        self.stored(submitted.request.id).await
    }

    /// Load a request, panicking when it is missing.
    pub async fn stored(&self, id: Uuid) -> Request {
        match must(self.registry.find_by_id(&id).await, "load request") {
            Some(request) => request,
            None => panic!("request {id} missing"),
        }
    }

    /// Submit and wait for processing.
    pub async fn processed(
        &self,
        kind: RequestKind,
        submitter: &Actor,
        rows: &[Vec<String>],
    ) -> Request {
        let submitted = must(self.submit(kind, submitter, rows).await, "submit");
        self.settle(&submitted).await
    }

    /// Submit, process, attach a document, and assign `reviewer`.
    pub async fn in_review(
        &self,
        kind: RequestKind,
        submitter: &Actor,
        rows: &[Vec<String>],
        reviewer: &Actor,
    ) -> Request {
        let request = self.processed(kind, submitter, rows).await;
        must(
            self.services
                .requests
                .attach_documents(
                    request.id,
                    submitter,
                    vec![Upload {
                        name: "invoice.pdf".to_owned(),
                        content: b"%PDF-1.4".to_vec(),
                    }],
                )
                .await,
            "attach documents",
        );
        must(
            self.services.requests.assign(request.id, reviewer.clone()).await,
            "assign",
        )
    }

    /// Record `status_code` on every section applicable to the request.
    pub async fn review_all(&self, request: &Request, reviewer: &Actor, status_code: i16) {
        for section_type in SectionType::for_kind(request.kind) {
            must(
                self.services
                    .reviews
                    .submit_section_review(
                        request.id,
                        reviewer,
                        SectionReview {
                            section_type: *section_type,
                            status_code,
                            comment: format!("{section_type} reviewed"),
                        },
                    )
                    .await,
                "section review",
            );
        }
    }

    /// Walk a request through review and submit the final review.
    pub async fn decide(
        &self,
        kind: RequestKind,
        submitter: &Actor,
        rows: &[Vec<String>],
        status_code: i16,
    ) -> Result<Request, Error> {
        let reviewer = Self::actor("reviewer-1");
        let request = self.in_review(kind, submitter, rows, &reviewer).await;
        self.review_all(&request, &reviewer, status_code).await;
        self.services
            .reviews
            .submit_final_review(request.id, &reviewer)
            .await
    }
}
