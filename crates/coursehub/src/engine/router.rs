use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::approval::{ApprovalError, ApprovalService, ReviewDecision};
use super::catalog::{CatalogError, CatalogService};
use super::domain::{
    CourseId, EnrollmentId, PaymentId, PaymentKind, RequestId, SessionId, UserId,
};
use super::enrollment::{EnrollmentError, EnrollmentService};
use super::events::{DomainEvent, Target};
use super::notification::NotificationDispatcher;

const PENDING_QUEUE_LIMIT: usize = 50;

/// Shared handle to the engine services, injected into every handler.
#[derive(Clone)]
pub struct EngineContext {
    pub enrollments: Arc<EnrollmentService>,
    pub approvals: Arc<ApprovalService>,
    pub catalog: Arc<CatalogService>,
    pub notifications: Arc<NotificationDispatcher>,
}

/// Router exposing the engine's HTTP contract. Authentication happens
/// upstream; the boundary supplies the acting user via the `x-actor-id`
/// header.
pub fn engine_router(context: EngineContext) -> Router {
    Router::new()
        .route("/api/v1/enrollments", post(enroll_handler))
        .route(
            "/api/v1/enrollments/:enrollment_id/cancel",
            post(cancel_handler),
        )
        .route("/api/v1/sessions", post(create_session_handler))
        .route("/api/v1/sessions/:session_id/roster", get(roster_handler))
        .route("/api/v1/courses/:course_id/submit", post(submit_course_handler))
        .route("/api/v1/payments", post(initiate_payment_handler))
        .route("/api/v1/payments/:payment_id", patch(refund_handler))
        .route("/api/v1/approvals/pending", get(pending_handler))
        .route("/api/v1/approvals/:request_id/approve", post(approve_handler))
        .route("/api/v1/approvals/:request_id/reject", post(reject_handler))
        .route("/api/v1/approvals/:request_id/reopen", post(reopen_handler))
        .route("/api/v1/notifications/broadcast", post(broadcast_handler))
        .with_state(context)
}

// Mutation payloads are closed types: unknown fields are rejected at the
// boundary instead of being merged in.

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EnrollRequest {
    user_id: UserId,
    session_id: SessionId,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateSessionRequest {
    course_id: CourseId,
    scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InitiatePaymentRequest {
    amount_cents: u64,
    kind: PaymentKind,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DecisionRequest {
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RefundRequest {
    status: RefundStatus,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RefundStatus {
    Refunded,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BroadcastRequest {
    target: Target,
    message: String,
    kind: String,
}

#[derive(Debug, Serialize)]
struct RosterResponse {
    session_id: SessionId,
    occupancy: u32,
    user_ids: Vec<UserId>,
}

async fn enroll_handler(
    State(context): State<EngineContext>,
    Json(payload): Json<EnrollRequest>,
) -> Response {
    match context
        .enrollments
        .enroll(&payload.user_id, &payload.session_id)
    {
        Ok(enrollment) => (StatusCode::CREATED, Json(enrollment)).into_response(),
        Err(err) => enrollment_error_response(&err),
    }
}

async fn cancel_handler(
    State(context): State<EngineContext>,
    Path(enrollment_id): Path<String>,
) -> Response {
    match context
        .enrollments
        .cancel(&EnrollmentId(enrollment_id))
    {
        Ok(enrollment) => (StatusCode::OK, Json(enrollment)).into_response(),
        Err(err) => enrollment_error_response(&err),
    }
}

async fn create_session_handler(
    State(context): State<EngineContext>,
    headers: HeaderMap,
    Json(payload): Json<CreateSessionRequest>,
) -> Response {
    let actor = match actor_id(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match context
        .catalog
        .create_session(&actor, &payload.course_id, payload.scheduled_at)
    {
        Ok(session) => (StatusCode::CREATED, Json(session)).into_response(),
        Err(err) => catalog_error_response(&err),
    }
}

async fn roster_handler(
    State(context): State<EngineContext>,
    Path(session_id): Path<String>,
) -> Response {
    let session_id = SessionId(session_id);
    let roster = context.enrollments.roster(&session_id);
    let occupancy = context.enrollments.occupancy(&session_id);
    match (roster, occupancy) {
        (Ok(user_ids), Ok(occupancy)) => (
            StatusCode::OK,
            Json(RosterResponse {
                session_id,
                occupancy,
                user_ids,
            }),
        )
            .into_response(),
        (Err(err), _) | (_, Err(err)) => enrollment_error_response(&err),
    }
}

async fn submit_course_handler(
    State(context): State<EngineContext>,
    headers: HeaderMap,
    Path(course_id): Path<String>,
) -> Response {
    let actor = match actor_id(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match context
        .approvals
        .submit_course(&CourseId(course_id), &actor)
    {
        Ok(request) => (StatusCode::CREATED, Json(request)).into_response(),
        Err(err) => approval_error_response(&err),
    }
}

async fn initiate_payment_handler(
    State(context): State<EngineContext>,
    headers: HeaderMap,
    Json(payload): Json<InitiatePaymentRequest>,
) -> Response {
    let actor = match actor_id(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match context
        .approvals
        .initiate_payment(&actor, payload.amount_cents, payload.kind)
    {
        Ok((payment, request)) => (
            StatusCode::CREATED,
            Json(json!({ "payment": payment, "request": request })),
        )
            .into_response(),
        Err(err) => approval_error_response(&err),
    }
}

async fn approve_handler(
    State(context): State<EngineContext>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
    payload: Option<Json<DecisionRequest>>,
) -> Response {
    decide(context, headers, request_id, ReviewDecision::Approve, payload)
}

async fn reject_handler(
    State(context): State<EngineContext>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
    payload: Option<Json<DecisionRequest>>,
) -> Response {
    decide(context, headers, request_id, ReviewDecision::Reject, payload)
}

fn decide(
    context: EngineContext,
    headers: HeaderMap,
    request_id: String,
    decision: ReviewDecision,
    payload: Option<Json<DecisionRequest>>,
) -> Response {
    let actor = match actor_id(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let notes = payload.and_then(|Json(body)| body.notes);
    match context
        .approvals
        .decide(&RequestId(request_id), &actor, decision, notes)
    {
        Ok(request) => (StatusCode::OK, Json(request)).into_response(),
        Err(err) => approval_error_response(&err),
    }
}

async fn reopen_handler(
    State(context): State<EngineContext>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Response {
    let actor = match actor_id(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match context.approvals.reopen(&RequestId(request_id), &actor) {
        Ok(request) => (StatusCode::OK, Json(request)).into_response(),
        Err(err) => approval_error_response(&err),
    }
}

async fn refund_handler(
    State(context): State<EngineContext>,
    headers: HeaderMap,
    Path(payment_id): Path<String>,
    Json(payload): Json<RefundRequest>,
) -> Response {
    let actor = match actor_id(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let RefundStatus::Refunded = payload.status;
    match context.approvals.refund(&PaymentId(payment_id), &actor) {
        Ok(payment) => (StatusCode::OK, Json(payment)).into_response(),
        Err(err) => approval_error_response(&err),
    }
}

async fn pending_handler(State(context): State<EngineContext>) -> Response {
    match context.approvals.pending(PENDING_QUEUE_LIMIT) {
        Ok(requests) => (StatusCode::OK, Json(requests)).into_response(),
        Err(err) => approval_error_response(&err),
    }
}

async fn broadcast_handler(
    State(context): State<EngineContext>,
    Json(payload): Json<BroadcastRequest>,
) -> Response {
    let event = DomainEvent::Broadcast {
        target: payload.target.clone(),
        message: payload.message,
        kind: payload.kind,
    };
    let recipients = context.notifications.dispatch(&event, &payload.target);
    (StatusCode::OK, Json(json!({ "recipients": recipients }))).into_response()
}

fn actor_id(headers: &HeaderMap) -> Result<UserId, Response> {
    headers
        .get("x-actor-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(|value| UserId(value.to_string()))
        .ok_or_else(|| {
            error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                "missing x-actor-id header",
            )
        })
}

fn enrollment_error_response(err: &EnrollmentError) -> Response {
    let (status, code) = match err {
        EnrollmentError::EntitlementDenied(_) => (StatusCode::FORBIDDEN, "entitlement_denied"),
        EnrollmentError::AlreadyEnrolled => (StatusCode::CONFLICT, "already_enrolled"),
        EnrollmentError::CapacityExceeded => (StatusCode::CONFLICT, "capacity_exceeded"),
        EnrollmentError::NotConfirmed => (StatusCode::CONFLICT, "not_confirmed"),
        EnrollmentError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        EnrollmentError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
    };
    error_response(status, code, &err.to_string())
}

fn approval_error_response(err: &ApprovalError) -> Response {
    let (status, code) = match err {
        ApprovalError::NotPending => (StatusCode::CONFLICT, "not_pending"),
        ApprovalError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
        ApprovalError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
        ApprovalError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        ApprovalError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
    };
    error_response(status, code, &err.to_string())
}

fn catalog_error_response(err: &CatalogError) -> Response {
    let (status, code) = match err {
        CatalogError::CourseNotApproved => (StatusCode::CONFLICT, "course_not_approved"),
        CatalogError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
        CatalogError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        CatalogError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
    };
    error_response(status, code, &err.to_string())
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(json!({ "error": code, "message": message }))).into_response()
}
