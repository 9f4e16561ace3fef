//! Tests for IMEI-to-UID associations.

use rstest::rstest;
use serde_json::json;
use uuid::Uuid;

use super::*;
use crate::domain::{
    AssociationPolicy, ErrorCode, LedgerEntry, LedgerStatus, RegistryPolicy,
};
use crate::test_support::{RegistryHarness, imei};

const IMEI: &str = "35678901000001";

fn whitelist(harness: &RegistryHarness, raw: &str) {
    let mut entry = LedgerEntry::staged(imei(raw), Uuid::new_v4(), harness.ctx.now());
    entry.status = LedgerStatus::Whitelist;
    harness.registry.insert_ledger_entry(entry);
}

fn harness_with(policy: AssociationPolicy) -> RegistryHarness {
    let harness = RegistryHarness::with_policy(RegistryPolicy {
        association: policy,
        ..RegistryPolicy::default()
    });
    whitelist(&harness, IMEI);
    harness
}

fn detail_code(error: &Error) -> Option<&serde_json::Value> {
    error.details().and_then(|details| details.get("code"))
}

#[rstest]
#[tokio::test]
async fn whitelisted_imeis_can_be_associated() {
    let harness = harness_with(AssociationPolicy::default());

    let outcome = harness
        .services
        .associations
        .associate(" 3567890100000123 ", "uid-1")
        .await
        .expect("associate");

    let AssociationOutcome::Associated(record) = outcome else {
        panic!("expected a new association, got {outcome:?}");
    };
    assert_eq!(record.imei.as_str(), IMEI);
    assert_eq!(record.uid, "uid-1");
    assert!(record.is_active());
    assert_eq!(harness.registry.associations().len(), 1);
}

#[rstest]
#[tokio::test]
async fn unknown_imeis_cannot_be_associated() {
    let harness = RegistryHarness::new();

    let error = harness
        .services
        .associations
        .associate(IMEI, "uid-1")
        .await
        .expect_err("not whitelisted");

    assert_eq!(error.code(), ErrorCode::NotFound);
}

#[rstest]
#[case("1234", "uid-1", "imei")]
#[case(IMEI, "  ", "uid")]
#[tokio::test]
async fn inputs_are_validated(#[case] raw: &str, #[case] uid: &str, #[case] key: &str) {
    let harness = harness_with(AssociationPolicy::default());

    let error = harness
        .services
        .associations
        .associate(raw, uid)
        .await
        .expect_err("invalid input");

    assert_eq!(error.code(), ErrorCode::InvalidRequest);
    assert!(error.details().is_some_and(|details| details.get(key).is_some()));
}

#[rstest]
#[tokio::test]
async fn the_same_pair_is_associated_once() {
    let harness = harness_with(AssociationPolicy::default());
    harness
        .services
        .associations
        .associate(IMEI, "uid-1")
        .await
        .expect("first");

    let error = harness
        .services
        .associations
        .associate(IMEI, "uid-1")
        .await
        .expect_err("second");

    assert_eq!(error.code(), ErrorCode::Conflict);
    assert_eq!(detail_code(&error), Some(&json!("already_associated_same_uid")));
}

#[rstest]
#[tokio::test]
async fn other_uids_are_refused_without_grace() {
    let harness = harness_with(AssociationPolicy::default());
    harness
        .services
        .associations
        .associate(IMEI, "uid-1")
        .await
        .expect("first");

    let error = harness
        .services
        .associations
        .associate(IMEI, "uid-2")
        .await
        .expect_err("held elsewhere");

    assert_eq!(error.code(), ErrorCode::Conflict);
    assert_eq!(
        error.details(),
        Some(&json!({ "code": "already_associated", "heldBy": ["uid-1"] }))
    );
}

#[rstest]
#[tokio::test]
async fn grace_period_asks_before_sharing() {
    let harness = harness_with(AssociationPolicy {
        grace_period: true,
        ..AssociationPolicy::default()
    });
    harness
        .services
        .associations
        .associate(IMEI, "uid-1")
        .await
        .expect("first");

    let outcome = harness
        .services
        .associations
        .associate(IMEI, "uid-2")
        .await
        .expect("confirmation");
    assert_eq!(
        outcome,
        AssociationOutcome::ConfirmationRequired {
            held_by: vec!["uid-1".to_owned()]
        }
    );

    let declined = harness
        .services
        .associations
        .confirm_duplicate(IMEI, "uid-2", false)
        .await
        .expect("decline");
    assert_eq!(declined, None);
    assert_eq!(harness.registry.associations().len(), 1);

    let shared = harness
        .services
        .associations
        .confirm_duplicate(IMEI, "uid-2", true)
        .await
        .expect("confirm")
        .expect("window opened");
    assert!(shared.duplicate);
    assert!(
        harness
            .registry
            .associations()
            .iter()
            .all(|record| record.duplicate)
    );
}

#[rstest]
#[tokio::test]
async fn uids_hold_a_bounded_number_of_devices() {
    let harness = harness_with(AssociationPolicy {
        max_devices_per_uid: 1,
        ..AssociationPolicy::default()
    });
    whitelist(&harness, "35678901000002");
    harness
        .services
        .associations
        .associate(IMEI, "uid-1")
        .await
        .expect("first");

    let error = harness
        .services
        .associations
        .associate("35678901000002", "uid-1")
        .await
        .expect_err("limit");

    assert_eq!(error.code(), ErrorCode::Conflict);
    assert_eq!(detail_code(&error), Some(&json!("uid_limit_reached")));
}

#[rstest]
#[tokio::test]
async fn deassociation_closes_the_open_window_once() {
    let harness = harness_with(AssociationPolicy::default());
    harness
        .services
        .associations
        .associate(IMEI, "uid-1")
        .await
        .expect("associate");
    harness.clock.advance_minutes(30);

    let closed = harness
        .services
        .associations
        .deassociate(IMEI, "uid-1")
        .await
        .expect("deassociate");
    assert_eq!(closed.end_date, Some(harness.ctx.now()));

    let error = harness
        .services
        .associations
        .deassociate(IMEI, "uid-1")
        .await
        .expect_err("already closed");
    assert_eq!(error.code(), ErrorCode::Conflict);

    let error = harness
        .services
        .associations
        .deassociate(IMEI, "uid-9")
        .await
        .expect_err("never associated");
    assert_eq!(error.code(), ErrorCode::NotApplicable);
}

#[rstest]
#[tokio::test]
async fn a_closed_pair_can_be_associated_again() {
    let harness = harness_with(AssociationPolicy::default());
    let services = &harness.services.associations;
    services.associate(IMEI, "uid-1").await.expect("associate");
    harness.clock.advance_minutes(5);
    services.deassociate(IMEI, "uid-1").await.expect("deassociate");
    harness.clock.advance_minutes(5);

    let outcome = services.associate(IMEI, "uid-1").await.expect("again");

    assert!(matches!(outcome, AssociationOutcome::Associated(_)));
    assert_eq!(harness.registry.associations().len(), 2);
    let actions = harness.audit.actions();
    assert_eq!(
        actions,
        vec![
            AuditAction::Associated,
            AuditAction::Deassociated,
            AuditAction::Associated
        ]
    );
}
