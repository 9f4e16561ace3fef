//! Tests for section and final reviews.

use rstest::rstest;
use serde_json::json;

use super::*;
use crate::domain::ports::AuditAction;
use crate::domain::{
    CaseStatus, DeviceQuota, DispositionEngine, ErrorCode, LedgerStatus, QuotaDefaults,
    RequestKind, SectionStatus,
};
use crate::test_support::{RegistryHarness, sequential_imeis};

fn rows(tac: &str, count: u32) -> Vec<Vec<String>> {
    sequential_imeis(tac, 1, count)
        .into_iter()
        .map(|imei| vec![imei])
        .collect()
}

fn review(section_type: SectionType, status_code: i16) -> SectionReview {
    SectionReview {
        section_type,
        status_code,
        comment: "checked".to_owned(),
    }
}

#[rstest]
#[tokio::test]
async fn section_reviews_append_to_the_comment_log() {
    let harness = RegistryHarness::new();
    let reviewer = RegistryHarness::actor("reviewer-1");
    let request = harness
        .in_review(
            RequestKind::Registration,
            &RegistryHarness::actor("user-1"),
            &rows("35678901", 1),
            &reviewer,
        )
        .await;

    harness
        .services
        .reviews
        .submit_section_review(request.id, &reviewer, review(SectionType::DeviceQuota, 5))
        .await
        .expect("first review");
    let section = harness
        .services
        .reviews
        .submit_section_review(request.id, &reviewer, review(SectionType::DeviceQuota, 6))
        .await
        .expect("second review");

    assert_eq!(section.status, Some(SectionStatus::Approved));
    assert_eq!(section.comments.len(), 2);
    assert!(harness.audit.actions().contains(&AuditAction::SectionReviewed));
}

#[rstest]
#[case(4)]
#[case(8)]
#[case(0)]
#[tokio::test]
async fn only_review_outcomes_are_accepted(#[case] code: i16) {
    let harness = RegistryHarness::new();
    let reviewer = RegistryHarness::actor("reviewer-1");
    let request = harness
        .in_review(
            RequestKind::Registration,
            &RegistryHarness::actor("user-1"),
            &rows("35678901", 1),
            &reviewer,
        )
        .await;

    let error = harness
        .services
        .reviews
        .submit_section_review(request.id, &reviewer, review(SectionType::DeviceQuota, code))
        .await
        .expect_err("bad code");

    assert_eq!(error.code(), ErrorCode::InvalidRequest);
}

#[rstest]
#[tokio::test]
async fn quota_section_does_not_apply_to_deregistrations() {
    let harness = RegistryHarness::new();
    let reviewer = RegistryHarness::actor("reviewer-1");
    let request = harness
        .in_review(
            RequestKind::DeRegistration,
            &RegistryHarness::actor("user-1"),
            &rows("35678901", 1),
            &reviewer,
        )
        .await;

    let error = harness
        .services
        .reviews
        .submit_section_review(request.id, &reviewer, review(SectionType::DeviceQuota, 6))
        .await
        .expect_err("not applicable");

    assert_eq!(error.code(), ErrorCode::InvalidRequest);
    let sections = harness
        .services
        .reviews
        .sections(request.id)
        .await
        .expect("sections");
    assert_eq!(sections.len(), 4);
}

#[rstest]
#[tokio::test]
async fn only_the_assigned_reviewer_may_review() {
    let harness = RegistryHarness::new();
    let request = harness
        .in_review(
            RequestKind::Registration,
            &RegistryHarness::actor("user-1"),
            &rows("35678901", 1),
            &RegistryHarness::actor("reviewer-1"),
        )
        .await;

    let error = harness
        .services
        .reviews
        .submit_section_review(
            request.id,
            &RegistryHarness::actor("reviewer-2"),
            review(SectionType::DeviceQuota, 6),
        )
        .await
        .expect_err("not assigned");

    assert_eq!(error.code(), ErrorCode::Forbidden);
}

#[rstest]
#[tokio::test]
async fn sections_include_unreviewed_ones() {
    let harness = RegistryHarness::new();
    let reviewer = RegistryHarness::actor("reviewer-1");
    let request = harness
        .in_review(
            RequestKind::Registration,
            &RegistryHarness::actor("user-1"),
            &rows("35678901", 1),
            &reviewer,
        )
        .await;
    harness
        .services
        .reviews
        .submit_section_review(request.id, &reviewer, review(SectionType::ImeiRegistration, 6))
        .await
        .expect("review");

    let sections = harness
        .services
        .reviews
        .sections(request.id)
        .await
        .expect("sections");

    let reviewed: Vec<SectionType> = sections
        .iter()
        .filter(|section| section.status.is_some())
        .map(|section| section.section_type)
        .collect();
    assert_eq!(sections.len(), 5);
    assert_eq!(reviewed, vec![SectionType::ImeiRegistration]);
}

#[rstest]
#[tokio::test]
async fn final_review_requires_every_section() {
    let harness = RegistryHarness::new();
    let reviewer = RegistryHarness::actor("reviewer-1");
    let request = harness
        .in_review(
            RequestKind::DeRegistration,
            &RegistryHarness::actor("user-1"),
            &rows("35678901", 1),
            &reviewer,
        )
        .await;
    for section_type in [
        SectionType::DeviceDescription,
        SectionType::ImeiClassification,
        SectionType::ImeiRegistration,
    ] {
        harness
            .services
            .reviews
            .submit_section_review(request.id, &reviewer, review(section_type, 6))
            .await
            .expect("review");
    }

    let error = harness
        .services
        .reviews
        .submit_final_review(request.id, &reviewer)
        .await
        .expect_err("incomplete");

    assert_eq!(error.code(), ErrorCode::Conflict);
    assert_eq!(
        error.details(),
        Some(&json!({ "pendingSections": ["approval_documents"] }))
    );
    assert_eq!(harness.stored(request.id).await.case_status, CaseStatus::InReview);
}

#[rstest]
#[tokio::test]
async fn approving_a_registration_whitelists_its_imeis() {
    let harness = RegistryHarness::new();
    let submitter = RegistryHarness::actor("user-1");

    let request = harness
        .decide(
            RequestKind::Registration,
            &submitter,
            &rows("35678901", 3),
            CaseStatus::Approved.code(),
        )
        .await
        .expect("approved");

    assert_eq!(request.case_status, CaseStatus::Approved);
    let entries = harness.registry.ledger_entries();
    assert_eq!(entries.len(), 3);
    assert!(
        entries
            .iter()
            .all(|entry| entry.status == LedgerStatus::Whitelist)
    );
    let quota = harness.registry.quota("user-1").expect("quota created");
    assert_eq!(quota.registration_remaining, 100_000 - 3);
    let sent = harness.notifications.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].status, CaseStatus::Approved);
    assert_eq!(sent[0].recipient_id, "user-1");
}

#[rstest]
#[tokio::test]
async fn rejecting_a_registration_drops_its_pending_entries() {
    let harness = RegistryHarness::new();

    let request = harness
        .decide(
            RequestKind::Registration,
            &RegistryHarness::actor("user-1"),
            &rows("35678901", 2),
            CaseStatus::Rejected.code(),
        )
        .await
        .expect("rejected");

    assert_eq!(request.case_status, CaseStatus::Rejected);
    assert!(harness.registry.ledger_entries().is_empty());
    assert_eq!(harness.registry.quota("user-1"), None);
}

#[rstest]
#[tokio::test]
async fn approving_a_deregistration_removes_approved_imeis() {
    let harness = RegistryHarness::new();
    let submitter = RegistryHarness::actor("user-1");
    harness
        .decide(
            RequestKind::Registration,
            &submitter,
            &rows("35678901", 2),
            CaseStatus::Approved.code(),
        )
        .await
        .expect("registered");

    let request = harness
        .decide(
            RequestKind::DeRegistration,
            &submitter,
            &rows("35678901", 1),
            CaseStatus::Approved.code(),
        )
        .await
        .expect("de-registered");

    assert_eq!(request.case_status, CaseStatus::Approved);
    let entries = harness.registry.ledger_entries();
    let removed: Vec<bool> = entries.iter().map(|entry| entry.removed).collect();
    assert_eq!(removed, vec![true, false]);
    assert_eq!(
        entries[0].status,
        LedgerStatus::Removed,
        "removed entries keep their row"
    );
}

#[rstest]
#[tokio::test]
async fn deregistering_unknown_imeis_leaves_the_request_in_review() {
    let harness = RegistryHarness::new();

    let error = harness
        .decide(
            RequestKind::DeRegistration,
            &RegistryHarness::actor("user-1"),
            &rows("35678901", 1),
            CaseStatus::Approved.code(),
        )
        .await
        .expect_err("not registered");

    assert_eq!(error.code(), ErrorCode::Conflict);
    assert_eq!(
        error.details().and_then(|details| details.get("code")),
        Some(&json!("not_registered"))
    );
    assert!(harness.notifications.sent().is_empty());
}

#[rstest]
#[case(5, &[2, 2])]
#[case(4, &[1, 3])]
#[case(6, &[3])]
#[tokio::test]
async fn quota_tracks_every_approval_and_refuses_once_exhausted(
    #[case] allowance: i64,
    #[case] approvals: &[u32],
) {
    let harness = RegistryHarness::new();
    let submitter = RegistryHarness::actor("user-1");
    harness.registry.insert_quota(DeviceQuota::new(
        "user-1",
        QuotaDefaults {
            registration: allowance,
            deregistration: 0,
        },
    ));

    let mut next = 1;
    for count in approvals {
        let file_rows: Vec<Vec<String>> = sequential_imeis("35678901", next, *count)
            .into_iter()
            .map(|imei| vec![imei])
            .collect();
        next += count;
        harness
            .decide(
                RequestKind::Registration,
                &submitter,
                &file_rows,
                CaseStatus::Approved.code(),
            )
            .await
            .expect("within quota");
    }
    let used: i64 = approvals.iter().map(|count| i64::from(*count)).sum();
    let remaining = allowance - used;
    assert_eq!(
        harness
            .registry
            .quota("user-1")
            .map(|quota| quota.registration_remaining),
        Some(remaining)
    );

    let over = u32::try_from(remaining + 1).expect("small count");
    let file_rows: Vec<Vec<String>> = sequential_imeis("35678901", next, over)
        .into_iter()
        .map(|imei| vec![imei])
        .collect();
    let error = harness
        .decide(
            RequestKind::Registration,
            &submitter,
            &file_rows,
            CaseStatus::Approved.code(),
        )
        .await
        .expect_err("quota exhausted");

    assert_eq!(error.code(), ErrorCode::Conflict);
    assert_eq!(
        error.details().and_then(|details| details.get("code")),
        Some(&json!("quota_exceeded"))
    );
    assert_eq!(
        harness
            .registry
            .quota("user-1")
            .map(|quota| quota.registration_remaining),
        Some(remaining)
    );
    let whitelisted = harness
        .registry
        .ledger_entries()
        .iter()
        .filter(|entry| entry.status == LedgerStatus::Whitelist)
        .count();
    assert_eq!(i64::try_from(whitelisted).ok(), Some(used));
}

#[rstest]
#[tokio::test]
async fn a_racing_final_review_commits_once() {
    let harness = RegistryHarness::new();
    let reviewer = RegistryHarness::actor("reviewer-1");
    let request = harness
        .in_review(
            RequestKind::Registration,
            &RegistryHarness::actor("user-1"),
            &rows("35678901", 2),
            &reviewer,
        )
        .await;
    harness
        .review_all(&request, &reviewer, CaseStatus::Approved.code())
        .await;
    let engine = DispositionEngine::new(harness.ctx.clone());

    engine
        .dispose(request.clone(), SectionStatus::Approved, &reviewer)
        .await
        .expect("first review commits");
    let error = engine
        .dispose(request, SectionStatus::Approved, &reviewer)
        .await
        .expect_err("second review read the same request");

    assert_eq!(error.code(), ErrorCode::Conflict);
    assert_eq!(
        error.details().and_then(|details| details.get("code")),
        Some(&json!("stale_request"))
    );
    let quota = harness.registry.quota("user-1").expect("quota created");
    assert_eq!(quota.registration_remaining, 100_000 - 2);
    assert_eq!(harness.notifications.sent().len(), 1);
}

#[rstest]
#[tokio::test]
async fn quota_counts_distinct_normalised_imeis() {
    let harness = RegistryHarness::new();
    let file_rows = vec![
        vec!["35678901000001".to_owned()],
        vec!["356789010000019".to_owned()],
    ];

    harness
        .decide(
            RequestKind::Registration,
            &RegistryHarness::actor("user-1"),
            &file_rows,
            CaseStatus::Approved.code(),
        )
        .await
        .expect("approved");

    assert_eq!(harness.registry.ledger_entries().len(), 1);
    let quota = harness.registry.quota("user-1").expect("quota created");
    assert_eq!(quota.registration_remaining, 100_000 - 1);
}
