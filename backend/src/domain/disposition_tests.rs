//! Tests for disposition commits.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rstest::{fixture, rstest};
use uuid::Uuid;

use super::*;
use crate::domain::ports::{
    FixtureComplianceChecker, FixtureDeviceDatabase, MockAssociationRepository, MockAuditSink,
    MockDocumentStore, MockLedgerRepository, MockListWriter, MockNotificationSink,
    MockQuotaRepository, MockRequestRepository, MockSectionRepository, NotificationSinkError,
    RequestRepositoryError,
};
use crate::domain::{
    CaseStatus, Device, DeviceDescription, DeviceQuota, ErrorCode, ImeiRecord,
    LedgerIntegrityError, QuotaDefaults, RegistryPolicy, RequestDraft, ServiceContext,
};
use crate::outbound::queue::TokioTaskQueue;
use crate::test_support::{MutableClock, imei};

struct Mocks {
    requests: MockRequestRepository,
    quotas: MockQuotaRepository,
    notifications: MockNotificationSink,
    audit: MockAuditSink,
}

impl Mocks {
    fn new() -> Self {
        Self {
            requests: MockRequestRepository::new(),
            quotas: MockQuotaRepository::new(),
            notifications: MockNotificationSink::new(),
            audit: MockAuditSink::new(),
        }
    }

    fn engine(self) -> DispositionEngine {
        let now = Utc
            .with_ymd_and_hms(2026, 4, 1, 8, 0, 0)
            .single()
            .expect("valid time");
        DispositionEngine::new(Arc::new(ServiceContext {
            requests: Arc::new(self.requests),
            sections: Arc::new(MockSectionRepository::new()),
            ledger: Arc::new(MockLedgerRepository::new()),
            quotas: Arc::new(self.quotas),
            associations: Arc::new(MockAssociationRepository::new()),
            device_database: Arc::new(FixtureDeviceDatabase),
            compliance: Arc::new(FixtureComplianceChecker),
            notifications: Arc::new(self.notifications),
            audit: Arc::new(self.audit),
            documents: Arc::new(MockDocumentStore::new()),
            tasks: Arc::new(TokioTaskQueue::new()),
            lists: Arc::new(MockListWriter::new()),
            clock: Arc::new(MutableClock::new(now)),
            policy: RegistryPolicy::default(),
        }))
    }
}

fn in_review(kind: RequestKind) -> Request {
    let now = Utc::now();
    let mut request = Request::open(
        RequestDraft {
            kind,
            submitter: Actor::new("user-1", "Submitter"),
            device_count: 1,
            imeis_per_device: 2,
            reason: None,
            file_name: "imeis.csv".to_owned(),
        },
        now,
    );
    request.case_status = CaseStatus::InReview;
    request.reviewer = Some(reviewer());
    request
}

fn reviewer() -> Actor {
    Actor::new("reviewer-1", "Reviewer")
}

fn device(request_id: Uuid, duplicates: &[bool]) -> Device {
    let imeis = duplicates
        .iter()
        .enumerate()
        .map(|(index, duplicate)| {
            let raw = format!("3567890100000{index}");
            let mut record = ImeiRecord::new(raw.clone(), imei(&raw));
            record.duplicate = *duplicate;
            record
        })
        .collect();
    Device {
        id: Uuid::new_v4(),
        request_id,
        tac: imei("35678901000000").tac(),
        description: DeviceDescription::unavailable(),
        device_count: 1,
        imeis,
    }
}

#[fixture]
fn mocks() -> Mocks {
    Mocks::new()
}

#[rstest]
#[tokio::test]
async fn duplicates_block_approval(mut mocks: Mocks) {
    let request = in_review(RequestKind::Registration);
    let devices = vec![device(request.id, &[false, true])];
    mocks
        .requests
        .expect_devices()
        .times(1)
        .return_once(move |_| Ok(devices));
    mocks.requests.expect_commit_disposition().times(0);
    mocks.notifications.expect_notify().times(0);
    mocks.audit.expect_record().times(0);

    let error = mocks
        .engine()
        .dispose(request, SectionStatus::Approved, &reviewer())
        .await
        .expect_err("duplicates present");

    assert_eq!(error.code(), ErrorCode::Conflict);
    assert_eq!(
        error.details(),
        Some(&json!({ "code": "duplicates_present", "imeis": ["35678901000001"] }))
    );
}

#[rstest]
#[tokio::test]
async fn exhausted_quota_blocks_approval(mut mocks: Mocks) {
    let request = in_review(RequestKind::Registration);
    let devices = vec![device(request.id, &[false, false])];
    mocks
        .requests
        .expect_devices()
        .return_once(move |_| Ok(devices));
    mocks.quotas.expect_find_or_create().return_once(|user, _| {
        let mut quota = DeviceQuota::new(user, QuotaDefaults::default());
        quota.registration_remaining = 1;
        Ok(quota)
    });
    mocks.requests.expect_commit_disposition().times(0);

    let error = mocks
        .engine()
        .dispose(request, SectionStatus::Approved, &reviewer())
        .await
        .expect_err("quota exceeded");

    assert_eq!(error.code(), ErrorCode::Conflict);
    assert_eq!(
        error.details().and_then(|details| details.get("code")),
        Some(&json!("quota_exceeded"))
    );
}

#[rstest]
#[tokio::test]
async fn approval_commits_ledger_and_quota_together(mut mocks: Mocks) {
    let request = in_review(RequestKind::Registration);
    let request_id = request.id;
    let devices = vec![device(request.id, &[false, false])];
    mocks
        .requests
        .expect_devices()
        .return_once(move |_| Ok(devices));
    mocks
        .quotas
        .expect_find_or_create()
        .return_once(|user, defaults| Ok(DeviceQuota::new(user, defaults)));
    mocks
        .requests
        .expect_commit_disposition()
        .times(1)
        .withf(move |commit| {
            commit.request.case_status == CaseStatus::Approved
                && commit.ledger
                    == Some(LedgerIntent::Whitelist {
                        request_id,
                        imeis: vec![imei("35678901000000"), imei("35678901000001")],
                    })
                && commit.quota
                    == Some(QuotaDebit {
                        user_id: "user-1".to_owned(),
                        kind: RequestKind::Registration,
                        count: 2,
                    })
        })
        .return_once(|_| Ok(()));
    mocks
        .notifications
        .expect_notify()
        .times(1)
        .withf(|notification| {
            notification.recipient_id == "user-1" && notification.status == CaseStatus::Approved
        })
        .return_once(|_| Ok(()));
    mocks
        .audit
        .expect_record()
        .times(1)
        .withf(|entry| {
            entry.action == AuditAction::Disposed
                && entry.from_status == Some(CaseStatus::InReview)
                && entry.to_status == Some(CaseStatus::Approved)
        })
        .return_const(());

    let settled = mocks
        .engine()
        .dispose(request, SectionStatus::Approved, &reviewer())
        .await
        .expect("approved");

    assert_eq!(settled.case_status, CaseStatus::Approved);
}

#[rstest]
#[tokio::test]
async fn rejected_deregistrations_touch_neither_ledger_nor_quota(mut mocks: Mocks) {
    let request = in_review(RequestKind::DeRegistration);
    let devices = vec![device(request.id, &[false])];
    mocks
        .requests
        .expect_devices()
        .return_once(move |_| Ok(devices));
    mocks.quotas.expect_find_or_create().times(0);
    mocks
        .requests
        .expect_commit_disposition()
        .times(1)
        .withf(|commit| commit.ledger.is_none() && commit.quota.is_none())
        .return_once(|_| Ok(()));
    mocks.notifications.expect_notify().return_once(|_| Ok(()));
    mocks.audit.expect_record().return_const(());

    let settled = mocks
        .engine()
        .dispose(request, SectionStatus::Rejected, &reviewer())
        .await
        .expect("rejected");

    assert_eq!(settled.case_status, CaseStatus::Rejected);
}

#[rstest]
#[tokio::test]
async fn notification_failures_do_not_undo_the_disposition(mut mocks: Mocks) {
    let request = in_review(RequestKind::Registration);
    let devices = vec![device(request.id, &[false])];
    mocks
        .requests
        .expect_devices()
        .return_once(move |_| Ok(devices));
    mocks
        .requests
        .expect_commit_disposition()
        .return_once(|_| Ok(()));
    mocks
        .notifications
        .expect_notify()
        .return_once(|_| Err(NotificationSinkError::delivery("smtp down")));
    mocks.audit.expect_record().times(1).return_const(());

    let settled = mocks
        .engine()
        .dispose(request, SectionStatus::Rejected, &reviewer())
        .await
        .expect("rejected despite notification failure");

    assert_eq!(settled.case_status, CaseStatus::Rejected);
}

#[rstest]
#[tokio::test]
async fn integrity_violations_surface_as_conflicts(mut mocks: Mocks) {
    let request = in_review(RequestKind::DeRegistration);
    let devices = vec![device(request.id, &[false])];
    mocks
        .requests
        .expect_devices()
        .return_once(move |_| Ok(devices));
    mocks
        .quotas
        .expect_find_or_create()
        .return_once(|user, defaults| Ok(DeviceQuota::new(user, defaults)));
    mocks.requests.expect_commit_disposition().return_once(|_| {
        Err(RequestRepositoryError::integrity(
            LedgerIntegrityError::NotRegistered {
                imeis: vec!["35678901000000".to_owned()],
            },
        ))
    });
    mocks.notifications.expect_notify().times(0);
    mocks.audit.expect_record().times(0);

    let error = mocks
        .engine()
        .dispose(request, SectionStatus::Approved, &reviewer())
        .await
        .expect_err("not registered");

    assert_eq!(error.code(), ErrorCode::Conflict);
}

#[rstest]
#[tokio::test]
async fn settling_outside_review_is_rejected(mut mocks: Mocks) {
    let mut request = in_review(RequestKind::Registration);
    request.case_status = CaseStatus::Closed;
    mocks
        .requests
        .expect_devices()
        .return_once(|_| Ok(Vec::new()));
    mocks.requests.expect_commit_disposition().times(0);

    let error = mocks
        .engine()
        .dispose(request, SectionStatus::Rejected, &reviewer())
        .await
        .expect_err("closed");

    assert_eq!(error.code(), ErrorCode::Conflict);
}
