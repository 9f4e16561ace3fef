//! Tests for the HTTP surface, driven through the in-memory registry.

use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{App, test as actix_test, web};
use serde_json::{Value, json};

use super::*;
use crate::domain::{SectionType, TaskHandle};
use crate::inbound::http::identity::{USER_ID_HEADER, USER_NAME_HEADER, USER_ROLE_HEADER};
use crate::test_support::{RegistryHarness, sequential_imeis};

const WAIT: Duration = Duration::from_secs(5);

macro_rules! test_app {
    ($harness:expr) => {
        actix_test::init_service(
            App::new()
                .app_data(web::Data::new(HttpState::new($harness.services.clone())))
                .service(web::scope("/api/v1").configure(crate::inbound::http::configure)),
        )
        .await
    };
}

fn as_user(req: actix_test::TestRequest, id: &str, role: &str) -> actix_test::TestRequest {
    req.insert_header((USER_ID_HEADER, id))
        .insert_header((USER_NAME_HEADER, format!("User {id}")))
        .insert_header((USER_ROLE_HEADER, role))
}

fn registration_body(imeis: &[String]) -> Value {
    json!({
        "kind": "registration",
        "deviceCount": imeis.len(),
        "imeisPerDevice": 1,
        "file": { "name": "imeis.csv", "content": imeis.join("\n") },
    })
}

async fn settle(harness: &RegistryHarness, submitted: &SubmittedBody) {
    harness
        .services
        .pipeline
        .wait(
            TaskHandle {
                key: submitted.task_key,
            },
            WAIT,
        )
        .await
        .expect("processing finishes");
}

#[actix_web::test]
async fn requests_without_identity_are_unauthorized() {
    let harness = RegistryHarness::new();
    let app = test_app!(harness);

    let res = actix_test::call_service(
        &app,
        actix_test::TestRequest::get().uri("/api/v1/dashboard").to_request(),
    )
    .await;

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn unknown_kinds_are_rejected_with_field_details() {
    let harness = RegistryHarness::new();
    let app = test_app!(harness);
    let mut body = registration_body(&sequential_imeis("35678901", 1, 1));
    body["kind"] = json!("import");

    let res = actix_test::call_service(
        &app,
        as_user(actix_test::TestRequest::post(), "user-1", "submitter")
            .uri("/api/v1/requests")
            .set_json(&body)
            .to_request(),
    )
    .await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let payload: Value = actix_test::read_body_json(res).await;
    assert_eq!(payload["details"]["code"], "invalid_choice");
}

#[actix_web::test]
async fn submitters_cannot_review() {
    let harness = RegistryHarness::new();
    let app = test_app!(harness);
    let id = uuid::Uuid::new_v4();

    let res = actix_test::call_service(
        &app,
        as_user(actix_test::TestRequest::post(), "user-1", "submitter")
            .uri(&format!("/api/v1/requests/{id}/assignment"))
            .to_request(),
    )
    .await;

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn foreign_requests_are_not_found() {
    let harness = RegistryHarness::new();
    let app = test_app!(harness);
    let submitted: SubmittedBody = actix_test::call_and_read_body_json(
        &app,
        as_user(actix_test::TestRequest::post(), "user-1", "submitter")
            .uri("/api/v1/requests")
            .set_json(registration_body(&sequential_imeis("35678901", 1, 2)))
            .to_request(),
    )
    .await;
    settle(&harness, &submitted).await;

    let res = actix_test::call_service(
        &app,
        as_user(actix_test::TestRequest::get(), "user-2", "submitter")
            .uri(&format!("/api/v1/requests/{}", submitted.request.id))
            .to_request(),
    )
    .await;

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn registration_runs_end_to_end_over_http() {
    let harness = RegistryHarness::new();
    let app = test_app!(harness);
    let imeis = sequential_imeis("35678901", 1, 2);

    let submitted: SubmittedBody = actix_test::call_and_read_body_json(
        &app,
        as_user(actix_test::TestRequest::post(), "user-1", "submitter")
            .uri("/api/v1/requests")
            .set_json(registration_body(&imeis))
            .to_request(),
    )
    .await;
    settle(&harness, &submitted).await;
    let id = submitted.request.id;

    let uploaded = actix_test::call_service(
        &app,
        as_user(actix_test::TestRequest::put(), "user-1", "submitter")
            .uri(&format!("/api/v1/requests/{id}/documents/invoice.pdf"))
            .set_payload("%PDF-1.4")
            .to_request(),
    )
    .await;
    assert_eq!(uploaded.status(), StatusCode::OK);

    let assigned: RequestBody = actix_test::call_and_read_body_json(
        &app,
        as_user(actix_test::TestRequest::post(), "reviewer-1", "reviewer")
            .uri(&format!("/api/v1/requests/{id}/assignment"))
            .to_request(),
    )
    .await;
    assert_eq!(assigned.status, CaseStatus::InReview.code());

    for section_type in SectionType::for_kind(crate::domain::RequestKind::Registration) {
        let res = actix_test::call_service(
            &app,
            as_user(actix_test::TestRequest::post(), "reviewer-1", "reviewer")
                .uri(&format!("/api/v1/requests/{id}/sections"))
                .set_json(json!({
                    "sectionType": section_type.as_str(),
                    "status": 6,
                    "comment": "looks fine",
                }))
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    let decided: RequestBody = actix_test::call_and_read_body_json(
        &app,
        as_user(actix_test::TestRequest::post(), "reviewer-1", "reviewer")
            .uri(&format!("/api/v1/requests/{id}/final-review"))
            .to_request(),
    )
    .await;
    assert_eq!(decided.status, CaseStatus::Approved.code());

    let listed = actix_test::call_service(
        &app,
        as_user(actix_test::TestRequest::post(), "reviewer-1", "reviewer")
            .uri("/api/v1/lists/full")
            .to_request(),
    )
    .await;
    assert_eq!(listed.status(), StatusCode::CREATED);
    let report: Value = actix_test::read_body_json(listed).await;
    assert_eq!(report["rows"], 2);

    let dashboard_counts: BTreeMap<String, i64> = actix_test::call_and_read_body_json(
        &app,
        as_user(actix_test::TestRequest::get(), "user-1", "submitter")
            .uri("/api/v1/dashboard")
            .to_request(),
    )
    .await;
    assert_eq!(dashboard_counts.get("Approved"), Some(&1));
    assert_eq!(dashboard_counts.len(), 8);
}

#[actix_web::test]
async fn closing_twice_is_informational() {
    let harness = RegistryHarness::new();
    let app = test_app!(harness);
    let submitted: SubmittedBody = actix_test::call_and_read_body_json(
        &app,
        as_user(actix_test::TestRequest::post(), "user-1", "submitter")
            .uri("/api/v1/requests")
            .set_json(registration_body(&sequential_imeis("35678901", 1, 1)))
            .to_request(),
    )
    .await;
    settle(&harness, &submitted).await;
    let uri = format!("/api/v1/requests/{}/close", submitted.request.id);

    let first: ClosedBody = actix_test::call_and_read_body_json(
        &app,
        as_user(actix_test::TestRequest::post(), "user-1", "submitter")
            .uri(&uri)
            .to_request(),
    )
    .await;
    let second: ClosedBody = actix_test::call_and_read_body_json(
        &app,
        as_user(actix_test::TestRequest::post(), "user-1", "submitter")
            .uri(&uri)
            .to_request(),
    )
    .await;

    assert_eq!(first.message, "request closed");
    assert_eq!(second.message, "request is already closed");
    assert_eq!(second.request.status, CaseStatus::Closed.code());
}

#[actix_web::test]
async fn reviewers_search_every_request() {
    let harness = RegistryHarness::new();
    let app = test_app!(harness);
    for (user, tac) in [("user-1", "35678901"), ("user-2", "86000001")] {
        let submitted: SubmittedBody = actix_test::call_and_read_body_json(
            &app,
            as_user(actix_test::TestRequest::post(), user, "submitter")
                .uri("/api/v1/requests")
                .set_json(registration_body(&sequential_imeis(tac, 1, 1)))
                .to_request(),
        )
        .await;
        settle(&harness, &submitted).await;
    }

    let all: PageBody = actix_test::call_and_read_body_json(
        &app,
        as_user(actix_test::TestRequest::post(), "reviewer-1", "reviewer")
            .uri("/api/v1/requests/search")
            .set_json(json!({}))
            .to_request(),
    )
    .await;
    let own: PageBody = actix_test::call_and_read_body_json(
        &app,
        as_user(actix_test::TestRequest::post(), "user-2", "submitter")
            .uri("/api/v1/requests/search")
            .set_json(json!({ "imei": "86000001000001" }))
            .to_request(),
    )
    .await;

    assert_eq!(all.total, 2);
    assert_eq!(own.total, 1);
    assert_eq!(own.items[0].submitter_id, "user-2");
}
