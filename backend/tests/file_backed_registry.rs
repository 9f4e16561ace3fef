//! End-to-end workflow over the capability-scoped file adapters.
//!
//! Repositories and remote services stay in memory; uploaded files and
//! generated lists land in a temporary directory and are read back.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use imei_registry::domain::{
    Actor, CaseStatus, CreateRequest, ExportSettings, ListKind, RegistryPolicy, RegistryServices,
    Request, RequestKind, SectionReview, SectionType, ServiceContext, TacMetadata, Upload,
};
use imei_registry::outbound::files::{CapStdDocumentStore, CsvListWriter};
use imei_registry::outbound::queue::TokioTaskQueue;
use imei_registry::test_support::{
    InMemoryRegistry, MutableClock, RecordingAuditSink, RecordingNotificationSink,
    ScriptedComplianceChecker, StaticDeviceDatabase, csv_upload, sequential_imeis,
};
use rstest::rstest;
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(5);

struct FileBackedRegistry {
    _dir: TempDir,
    uploads: std::path::PathBuf,
    lists: std::path::PathBuf,
    clock: Arc<MutableClock>,
    services: RegistryServices,
}

impl FileBackedRegistry {
    fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let uploads = dir.path().join("uploads");
        let lists = dir.path().join("lists");
        let start = Utc
            .with_ymd_and_hms(2026, 5, 1, 12, 30, 0)
            .single()
            .expect("valid start");
        let clock = Arc::new(MutableClock::new(start));
        let registry = InMemoryRegistry::new();
        let device_database = Arc::new(StaticDeviceDatabase::new());
        device_database.insert(
            "35678901",
            TacMetadata {
                brand: Some("Acme".to_owned()),
                model: Some("Rocket".to_owned()),
                model_number: Some("R-1".to_owned()),
                manufacturer: Some("Acme, Inc".to_owned()),
                device_type: Some("Smartphone".to_owned()),
                radio_interfaces: vec!["WCDMA".to_owned()],
                ..TacMetadata::default()
            },
        );

        let ctx = Arc::new(ServiceContext {
            requests: Arc::new(registry.clone()),
            sections: Arc::new(registry.clone()),
            ledger: Arc::new(registry.clone()),
            quotas: Arc::new(registry.clone()),
            associations: Arc::new(registry),
            device_database,
            compliance: Arc::new(ScriptedComplianceChecker::new()),
            notifications: Arc::new(RecordingNotificationSink::new()),
            audit: Arc::new(RecordingAuditSink::new()),
            documents: Arc::new(CapStdDocumentStore::open(&uploads).expect("document store")),
            tasks: Arc::new(TokioTaskQueue::new()),
            lists: Arc::new(CsvListWriter::open(&lists).expect("list writer")),
            clock: clock.clone(),
            policy: RegistryPolicy::default(),
        });

        Self {
            _dir: dir,
            uploads,
            lists,
            clock,
            services: RegistryServices::new(
                ctx,
                ExportSettings {
                    workers: 2,
                    batches: 2,
                },
            ),
        }
    }

    async fn approve(&self, kind: RequestKind, imeis: Vec<String>) -> Request {
        let submitter = Actor::new("user-1", "User One");
        let reviewer = Actor::new("reviewer-1", "Reviewer One");
        let rows: Vec<Vec<String>> = imeis.into_iter().map(|imei| vec![imei]).collect();
        let submitted = self
            .services
            .requests
            .create(CreateRequest {
                kind,
                submitter: submitter.clone(),
                device_count: rows.len(),
                imeis_per_device: Some(1),
                reason: match kind {
                    RequestKind::Registration => None,
                    RequestKind::DeRegistration => Some("devices retired".to_owned()),
                },
                file: csv_upload("imeis.csv", &rows),
            })
            .await
            .expect("create");
        self.services
            .pipeline
            .wait(submitted.task, WAIT)
            .await
            .expect("processing finishes");
        let id = submitted.request.id;

        self.services
            .requests
            .attach_documents(
                id,
                &submitter,
                vec![Upload {
                    name: "invoice.pdf".to_owned(),
                    content: b"%PDF-1.4".to_vec(),
                }],
            )
            .await
            .expect("attach");
        self.services
            .requests
            .assign(id, reviewer.clone())
            .await
            .expect("assign");
        for section_type in SectionType::for_kind(kind) {
            self.services
                .reviews
                .submit_section_review(
                    id,
                    &reviewer,
                    SectionReview {
                        section_type: *section_type,
                        status_code: CaseStatus::Approved.code(),
                        comment: "verified".to_owned(),
                    },
                )
                .await
                .expect("section review");
        }
        self.services
            .reviews
            .submit_final_review(id, &reviewer)
            .await
            .expect("final review")
    }
}

fn read(dir: &Path, name: &str) -> String {
    fs::read_to_string(dir.join(name)).expect("list file readable")
}

#[rstest]
#[tokio::test]
async fn uploads_are_stored_under_the_tracking_id() {
    let registry = FileBackedRegistry::new();

    let request = registry
        .approve(RequestKind::Registration, sequential_imeis("35678901", 1, 1))
        .await;

    assert_eq!(request.case_status, CaseStatus::Approved);
    let folder = registry.uploads.join(request.tracking_id.to_string());
    assert_eq!(
        fs::read(folder.join("invoice.pdf")).expect("document stored"),
        b"%PDF-1.4"
    );
    assert!(folder.join("imeis.csv").exists());
    let names = registry
        .services
        .requests
        .documents(request.id, None)
        .await
        .expect("list documents");
    assert_eq!(names, vec!["imeis.csv".to_owned(), "invoice.pdf".to_owned()]);
}

#[rstest]
#[tokio::test]
async fn full_and_delta_lists_are_written_as_csv() {
    let registry = FileBackedRegistry::new();
    registry
        .approve(RequestKind::Registration, sequential_imeis("35678901", 1, 2))
        .await;

    let full = registry
        .services
        .lists
        .generate(ListKind::Full)
        .await
        .expect("generate")
        .expect("full list");
    assert_eq!(full.file_name, "full_registration_list_20260501123000.csv");
    assert_eq!(
        read(&registry.lists, &full.file_name),
        "APPROVED_IMEI,make,model,status,model_number,brand_name,device_type,radio_interface\n\
         35678901000001,\"Acme, Inc\",Rocket,whitelist,R-1,Acme,Smartphone,3G\n\
         35678901000002,\"Acme, Inc\",Rocket,whitelist,R-1,Acme,Smartphone,3G\n"
    );

    registry.clock.advance_minutes(1);
    let delta = registry
        .services
        .lists
        .generate(ListKind::Delta)
        .await
        .expect("generate")
        .expect("delta list");
    let content = read(&registry.lists, &delta.file_name);
    let mut lines = content.lines();
    assert_eq!(
        lines.next(),
        Some(
            "APPROVED_IMEI,make,model,status,model_number,brand_name,device_type,radio_interface,change_type"
        )
    );
    assert!(lines.all(|line| line.ends_with(",add")));

    registry.clock.advance_minutes(1);
    let repeat = registry
        .services
        .lists
        .generate(ListKind::Delta)
        .await
        .expect("generate");
    assert_eq!(repeat, None, "exported changes are not listed again");
}

#[rstest]
#[tokio::test]
async fn deregistered_imeis_leave_the_full_list() {
    let registry = FileBackedRegistry::new();
    registry
        .approve(RequestKind::Registration, sequential_imeis("35678901", 1, 2))
        .await;
    registry.clock.advance_minutes(5);
    registry
        .approve(RequestKind::DeRegistration, sequential_imeis("35678901", 2, 1))
        .await;
    registry.clock.advance_minutes(5);

    let full = registry
        .services
        .lists
        .generate(ListKind::Full)
        .await
        .expect("generate")
        .expect("full list");

    assert_eq!(full.rows, 1);
    let content = read(&registry.lists, &full.file_name);
    assert!(content.contains("35678901000001"));
    assert!(!content.contains("35678901000002"));
}
