use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use super::common::{harness, Harness};
use crate::engine::domain::Role;
use crate::engine::memory::RecordingSender;
use crate::engine::notification::NotificationDispatcher;
use crate::engine::router::{engine_router, EngineContext};

fn router_for(harness: &Harness) -> Router {
    let dispatcher = Arc::new(NotificationDispatcher::new(
        harness.users.clone(),
        harness.catalog.clone(),
        harness.enrollment_repo.clone(),
        Arc::new(RecordingSender::new()),
    ));
    engine_router(EngineContext {
        enrollments: harness.enrollments.clone(),
        approvals: harness.approvals.clone(),
        catalog: harness.sessions.clone(),
        notifications: dispatcher,
    })
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

fn post_as(uri: &str, actor: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-actor-id", actor);
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request builds")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body read");
    serde_json::from_slice(&bytes).expect("body is json")
}

#[tokio::test]
async fn enroll_returns_201_and_conflicts_map_to_409() {
    let harness = harness();
    let session = harness.open_session(1);
    harness.add_user("student-1", Role::Student);
    harness.add_user("student-2", Role::Student);
    let app = router_for(&harness);

    let body = json!({ "user_id": "student-1", "session_id": session.0 });
    let response = app
        .clone()
        .oneshot(post("/api/v1/enrollments", body.clone()))
        .await
        .expect("request handled");
    assert_eq!(response.status(), StatusCode::CREATED);
    let enrollment = body_json(response).await;
    assert_eq!(enrollment["state"], "confirmed");

    let response = app
        .clone()
        .oneshot(post("/api/v1/enrollments", body))
        .await
        .expect("request handled");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"], "already_enrolled");

    let response = app
        .oneshot(post(
            "/api/v1/enrollments",
            json!({ "user_id": "student-2", "session_id": session.0 }),
        ))
        .await
        .expect("request handled");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"], "capacity_exceeded");
}

#[tokio::test]
async fn entitlement_denial_maps_to_403() {
    let harness = harness();
    let trainer = harness.add_user("trainer-1", Role::Trainer);
    let course = harness.add_course(
        "paid",
        &trainer,
        49_00,
        5,
        crate::engine::domain::CourseApproval::Approved,
    );
    let session = harness.add_session("session-1", &course);
    harness.add_user("student-1", Role::Student);
    let app = router_for(&harness);

    let response = app
        .oneshot(post(
            "/api/v1/enrollments",
            json!({ "user_id": "student-1", "session_id": session.0 }),
        ))
        .await
        .expect("request handled");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "entitlement_denied");
}

#[tokio::test]
async fn unknown_payload_fields_are_rejected_at_the_boundary() {
    let harness = harness();
    let session = harness.open_session(5);
    harness.add_user("student-1", Role::Student);
    let app = router_for(&harness);

    let response = app
        .oneshot(post(
            "/api/v1/enrollments",
            json!({
                "user_id": "student-1",
                "session_id": session.0,
                "seats": 99
            }),
        ))
        .await
        .expect("request handled");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn cancel_transitions_and_conflicts_map_to_409() {
    let harness = harness();
    let session = harness.open_session(5);
    let student = harness.add_user("student-1", Role::Student);
    let enrollment = harness
        .enrollments
        .enroll(&student, &session)
        .expect("enrolls");
    let app = router_for(&harness);

    let uri = format!("/api/v1/enrollments/{}/cancel", enrollment.id.0);
    let response = app
        .clone()
        .oneshot(post(&uri, json!({})))
        .await
        .expect("request handled");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["state"], "cancelled");

    let response = app.oneshot(post(&uri, json!({}))).await.expect("handled");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"], "not_confirmed");
}

#[tokio::test]
async fn decisions_require_an_actor_identity() {
    let harness = harness();
    let trainer = harness.add_user("trainer-1", Role::Trainer);
    let course = harness.add_course(
        "draft",
        &trainer,
        0,
        5,
        crate::engine::domain::CourseApproval::Pending,
    );
    let request = harness
        .approvals
        .submit_course(&course, &trainer)
        .expect("submitted");
    let app = router_for(&harness);

    let uri = format!("/api/v1/approvals/{}/approve", request.id.0);
    let response = app
        .oneshot(post(&uri, json!({})))
        .await
        .expect("request handled");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["error"], "validation_error");
}

#[tokio::test]
async fn approval_flow_maps_decisions_and_races_to_stable_codes() {
    let harness = harness();
    harness.add_user("admin-1", Role::Admin);
    let trainer = harness.add_user("trainer-1", Role::Trainer);
    let course = harness.add_course(
        "draft",
        &trainer,
        0,
        5,
        crate::engine::domain::CourseApproval::Pending,
    );
    let request = harness
        .approvals
        .submit_course(&course, &trainer)
        .expect("submitted");
    let app = router_for(&harness);

    let reject_uri = format!("/api/v1/approvals/{}/reject", request.id.0);
    let response = app
        .clone()
        .oneshot(post_as(&reject_uri, "admin-1", Some(json!({ "notes": "" }))))
        .await
        .expect("request handled");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let approve_uri = format!("/api/v1/approvals/{}/approve", request.id.0);
    let response = app
        .clone()
        .oneshot(post_as(&approve_uri, "trainer-1", None))
        .await
        .expect("request handled");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "forbidden");

    let response = app
        .clone()
        .oneshot(post_as(&approve_uri, "admin-1", None))
        .await
        .expect("request handled");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "approved");

    let response = app
        .oneshot(post_as(&approve_uri, "admin-1", None))
        .await
        .expect("request handled");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"], "not_pending");
}

#[tokio::test]
async fn refund_is_rejected_until_the_payment_is_approved() {
    let harness = harness();
    harness.add_user("admin-1", Role::Admin);
    let trainer = harness.add_user("trainer-1", Role::Trainer);
    let buyer = harness.add_user("student-1", Role::Student);
    let course = harness.add_course(
        "paid",
        &trainer,
        100_00,
        5,
        crate::engine::domain::CourseApproval::Approved,
    );
    let (payment, request) = harness
        .approvals
        .initiate_payment(
            &buyer,
            10_000,
            crate::engine::domain::PaymentKind::CoursePurchase {
                course_id: course.clone(),
            },
        )
        .expect("payment initiated");
    let app = router_for(&harness);

    let refund = Request::builder()
        .method("PATCH")
        .uri(format!("/api/v1/payments/{}", payment.id.0))
        .header("x-actor-id", "admin-1")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "status": "refunded" }).to_string()))
        .expect("request builds");
    let response = app
        .clone()
        .oneshot(refund)
        .await
        .expect("request handled");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"], "not_pending");

    let approve_uri = format!("/api/v1/approvals/{}/approve", request.id.0);
    let response = app
        .clone()
        .oneshot(post_as(&approve_uri, "admin-1", None))
        .await
        .expect("request handled");
    assert_eq!(response.status(), StatusCode::OK);

    let refund = Request::builder()
        .method("PATCH")
        .uri(format!("/api/v1/payments/{}", payment.id.0))
        .header("x-actor-id", "admin-1")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "status": "refunded" }).to_string()))
        .expect("request builds");
    let response = app.oneshot(refund).await.expect("request handled");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "refunded");
}

#[tokio::test]
async fn broadcast_reports_the_recipient_count() {
    let harness = harness();
    let session = harness.open_session(5);
    let first = harness.add_user("student-1", Role::Student);
    let second = harness.add_user("student-2", Role::Student);
    harness.enrollments.enroll(&first, &session).expect("enrolls");
    harness
        .enrollments
        .enroll(&second, &session)
        .expect("enrolls");
    let app = router_for(&harness);

    let response = app
        .oneshot(post(
            "/api/v1/notifications/broadcast",
            json!({
                "target": { "scope": "session_enrollees", "session_id": session.0 },
                "message": "room moved to B-204",
                "kind": "announcement"
            }),
        ))
        .await
        .expect("request handled");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["recipients"], 2);
}
