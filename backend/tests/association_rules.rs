//! Associations against IMEIs whitelisted through the approval workflow.

use imei_registry::domain::{
    AssociationOutcome, AssociationPolicy, CaseStatus, ErrorCode, RegistryPolicy, RequestKind,
};
use imei_registry::test_support::{RegistryHarness, sequential_imeis};
use rstest::rstest;

fn rows(tac: &str, start: u32, count: u32) -> Vec<Vec<String>> {
    sequential_imeis(tac, start, count)
        .into_iter()
        .map(|imei| vec![imei])
        .collect()
}

async fn whitelisted(policy: AssociationPolicy, count: u32) -> RegistryHarness {
    let harness = RegistryHarness::with_policy(RegistryPolicy {
        association: policy,
        ..RegistryPolicy::default()
    });
    let request = harness
        .decide(
            RequestKind::Registration,
            &RegistryHarness::actor("user-1"),
            &rows("35678901", 1, count),
            CaseStatus::Approved.code(),
        )
        .await
        .expect("approved");
    assert_eq!(request.case_status, CaseStatus::Approved);
    harness
}

#[rstest]
#[tokio::test]
async fn approved_imeis_can_be_associated_and_released() {
    let harness = whitelisted(AssociationPolicy::default(), 1).await;
    let associations = &harness.services.associations;

    let outcome = associations
        .associate("35678901000001", "uid-7")
        .await
        .expect("associate");
    assert!(matches!(outcome, AssociationOutcome::Associated(_)));

    let closed = associations
        .deassociate("35678901000001", "uid-7")
        .await
        .expect("deassociate");
    assert!(closed.end_date.is_some());

    let again = associations
        .deassociate("35678901000001", "uid-7")
        .await
        .expect_err("nothing left to close");
    assert_eq!(again.code(), ErrorCode::Conflict);
}

#[rstest]
#[tokio::test]
async fn pending_imeis_are_not_associable() {
    let harness = RegistryHarness::new();
    harness
        .processed(
            RequestKind::Registration,
            &RegistryHarness::actor("user-1"),
            &rows("35678901", 1, 1),
        )
        .await;

    let error = harness
        .services
        .associations
        .associate("35678901000001", "uid-7")
        .await
        .expect_err("not yet approved");

    assert_eq!(error.code(), ErrorCode::NotFound);
}

#[rstest]
#[tokio::test]
async fn a_uid_is_limited_to_its_device_allowance() {
    let policy = AssociationPolicy {
        max_devices_per_uid: 2,
        grace_period: false,
    };
    let harness = whitelisted(policy, 3).await;
    let associations = &harness.services.associations;
    for imei in sequential_imeis("35678901", 1, 2) {
        associations.associate(&imei, "uid-7").await.expect("within limit");
    }

    let error = associations
        .associate("35678901000003", "uid-7")
        .await
        .expect_err("limit reached");

    assert_eq!(error.code(), ErrorCode::Conflict);
    assert_eq!(
        error.details().and_then(|details| details.get("code")),
        Some(&serde_json::json!("uid_limit_reached"))
    );
    assert_eq!(harness.registry.associations().len(), 2);
}

#[rstest]
#[tokio::test]
async fn shared_imeis_need_confirmation_under_a_grace_period() {
    let policy = AssociationPolicy {
        max_devices_per_uid: 5,
        grace_period: true,
    };
    let harness = whitelisted(policy, 1).await;
    let associations = &harness.services.associations;
    associations
        .associate("35678901000001", "uid-1")
        .await
        .expect("first holder");

    let outcome = associations
        .associate("35678901000001", "uid-2")
        .await
        .expect("second holder asks");
    assert_eq!(
        outcome,
        AssociationOutcome::ConfirmationRequired {
            held_by: vec!["uid-1".to_owned()]
        }
    );

    let declined = associations
        .confirm_duplicate("35678901000001", "uid-2", false)
        .await
        .expect("decline");
    assert_eq!(declined, None);
    assert_eq!(harness.registry.associations().len(), 1);

    let shared = associations
        .confirm_duplicate("35678901000001", "uid-2", true)
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
