use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{EvaluationId, PersonId};
use super::repository::{
    EvaluationRef, EvaluationRepository, NotificationPublisher, RepositoryError, TemplateStore,
};
use super::service::{
    CreateManagerEvaluation, CreateSelfEvaluation, EvaluationService, EvaluationServiceError,
    ManagerAssignment, ResponseSubmission, SelfAssignment,
};
use super::workflow::{WorkflowAction, WorkflowStage};

/// Router builder exposing the evaluation service over HTTP.
pub fn evaluation_router<T, R, N>(service: Arc<EvaluationService<T, R, N>>) -> Router
where
    T: TemplateStore + 'static,
    R: EvaluationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    Router::new()
        .route(
            "/api/v1/evaluations/self",
            get(list_self_handler::<T, R, N>).post(create_self_handler::<T, R, N>),
        )
        .route(
            "/api/v1/evaluations/manager",
            get(list_manager_handler::<T, R, N>).post(create_manager_handler::<T, R, N>),
        )
        .route(
            "/api/v1/assignments/self",
            post(assign_self_handler::<T, R, N>),
        )
        .route(
            "/api/v1/assignments/manager",
            post(assign_manager_handler::<T, R, N>),
        )
        .route(
            "/api/v1/evaluations/self/:id",
            get(self_status_handler::<T, R, N>),
        )
        .route(
            "/api/v1/evaluations/manager/:id",
            get(manager_status_handler::<T, R, N>),
        )
        .route(
            "/api/v1/evaluations/self/:id/responses",
            put(self_responses_handler::<T, R, N>),
        )
        .route(
            "/api/v1/evaluations/manager/:id/responses",
            put(manager_responses_handler::<T, R, N>),
        )
        .route(
            "/api/v1/evaluations/self/:id/complete",
            post(complete_self_handler::<T, R, N>),
        )
        .route(
            "/api/v1/evaluations/manager/:id/complete",
            post(complete_manager_handler::<T, R, N>),
        )
        .route(
            "/api/v1/evaluations/manager/:id/give-feedback",
            post(give_feedback_handler::<T, R, N>),
        )
        .route(
            "/api/v1/evaluations/manager/:id/close-for-signature",
            post(close_for_signature_handler::<T, R, N>),
        )
        .route(
            "/api/v1/evaluations/manager/:id/sign",
            post(sign_handler::<T, R, N>),
        )
        .route(
            "/api/v1/evaluations/manager/:id/deny",
            post(deny_handler::<T, R, N>),
        )
        .route(
            "/api/v1/evaluations/manager/:id/comparison",
            get(comparison_handler::<T, R, N>),
        )
        .route(
            "/api/v1/evaluations/self/:id/snapshot/backfill",
            post(backfill_self_handler::<T, R, N>),
        )
        .route(
            "/api/v1/evaluations/manager/:id/snapshot/backfill",
            post(backfill_manager_handler::<T, R, N>),
        )
        .route(
            "/api/v1/maintenance/snapshot-backfill",
            post(backfill_sweep_handler::<T, R, N>),
        )
        .with_state(service)
}

fn error_response(error: EvaluationServiceError) -> Response {
    let status = match &error {
        EvaluationServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EvaluationServiceError::State(_) => StatusCode::CONFLICT,
        EvaluationServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        EvaluationServiceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        EvaluationServiceError::Repository(RepositoryError::Unavailable(_))
        | EvaluationServiceError::Integrity(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({ "error": error.to_string() });
    (status, axum::Json(payload)).into_response()
}

async fn create_self_handler<T, R, N>(
    State(service): State<Arc<EvaluationService<T, R, N>>>,
    axum::Json(request): axum::Json<CreateSelfEvaluation>,
) -> Response
where
    T: TemplateStore + 'static,
    R: EvaluationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.create_self(request) {
        Ok(record) => (
            StatusCode::CREATED,
            axum::Json(json!({
                "id": record.core.id,
                "snapshot_version": record.core.snapshot_version,
            })),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

async fn create_manager_handler<T, R, N>(
    State(service): State<Arc<EvaluationService<T, R, N>>>,
    axum::Json(request): axum::Json<CreateManagerEvaluation>,
) -> Response
where
    T: TemplateStore + 'static,
    R: EvaluationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.create_manager(request) {
        Ok(record) => (
            StatusCode::CREATED,
            axum::Json(json!({
                "id": record.core.id,
                "snapshot_version": record.core.snapshot_version,
            })),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

async fn assign_self_handler<T, R, N>(
    State(service): State<Arc<EvaluationService<T, R, N>>>,
    axum::Json(assignment): axum::Json<SelfAssignment>,
) -> Response
where
    T: TemplateStore + 'static,
    R: EvaluationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.assign_self(assignment) {
        Ok(outcome) => (StatusCode::CREATED, axum::Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn assign_manager_handler<T, R, N>(
    State(service): State<Arc<EvaluationService<T, R, N>>>,
    axum::Json(assignment): axum::Json<ManagerAssignment>,
) -> Response
where
    T: TemplateStore + 'static,
    R: EvaluationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.assign_manager(assignment) {
        Ok(outcome) => (StatusCode::CREATED, axum::Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
struct SelfListQuery {
    subject: u64,
    #[serde(default)]
    completed: Option<bool>,
}

async fn list_self_handler<T, R, N>(
    State(service): State<Arc<EvaluationService<T, R, N>>>,
    Query(query): Query<SelfListQuery>,
) -> Response
where
    T: TemplateStore + 'static,
    R: EvaluationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.self_evaluations_for(PersonId(query.subject), query.completed) {
        Ok(views) => (StatusCode::OK, axum::Json(views)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
struct ManagerListQuery {
    evaluator: u64,
    #[serde(default)]
    stage: Option<WorkflowStage>,
}

async fn list_manager_handler<T, R, N>(
    State(service): State<Arc<EvaluationService<T, R, N>>>,
    Query(query): Query<ManagerListQuery>,
) -> Response
where
    T: TemplateStore + 'static,
    R: EvaluationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.manager_evaluations_for(PersonId(query.evaluator), query.stage) {
        Ok(views) => (StatusCode::OK, axum::Json(views)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn self_status_handler<T, R, N>(
    State(service): State<Arc<EvaluationService<T, R, N>>>,
    Path(id): Path<u64>,
) -> Response
where
    T: TemplateStore + 'static,
    R: EvaluationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.self_evaluation(EvaluationId(id)) {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

async fn manager_status_handler<T, R, N>(
    State(service): State<Arc<EvaluationService<T, R, N>>>,
    Path(id): Path<u64>,
) -> Response
where
    T: TemplateStore + 'static,
    R: EvaluationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.manager_evaluation(EvaluationId(id)) {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

async fn self_responses_handler<T, R, N>(
    State(service): State<Arc<EvaluationService<T, R, N>>>,
    Path(id): Path<u64>,
    axum::Json(submission): axum::Json<ResponseSubmission>,
) -> Response
where
    T: TemplateStore + 'static,
    R: EvaluationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.submit_self_responses(EvaluationId(id), submission) {
        Ok(breakdown) => (StatusCode::OK, axum::Json(breakdown)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn manager_responses_handler<T, R, N>(
    State(service): State<Arc<EvaluationService<T, R, N>>>,
    Path(id): Path<u64>,
    axum::Json(submission): axum::Json<ResponseSubmission>,
) -> Response
where
    T: TemplateStore + 'static,
    R: EvaluationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.submit_manager_responses(EvaluationId(id), submission) {
        Ok(breakdown) => (StatusCode::OK, axum::Json(breakdown)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn complete_self_handler<T, R, N>(
    State(service): State<Arc<EvaluationService<T, R, N>>>,
    Path(id): Path<u64>,
) -> Response
where
    T: TemplateStore + 'static,
    R: EvaluationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.complete_self(EvaluationId(id)) {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

fn advance_response<T, R, N>(
    service: &EvaluationService<T, R, N>,
    id: u64,
    action: WorkflowAction,
) -> Response
where
    T: TemplateStore + 'static,
    R: EvaluationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.advance(EvaluationId(id), action) {
        Ok(stage) => (
            StatusCode::OK,
            axum::Json(json!({ "stage": stage.label() })),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

async fn complete_manager_handler<T, R, N>(
    State(service): State<Arc<EvaluationService<T, R, N>>>,
    Path(id): Path<u64>,
) -> Response
where
    T: TemplateStore + 'static,
    R: EvaluationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    advance_response(&service, id, WorkflowAction::Complete)
}

async fn give_feedback_handler<T, R, N>(
    State(service): State<Arc<EvaluationService<T, R, N>>>,
    Path(id): Path<u64>,
) -> Response
where
    T: TemplateStore + 'static,
    R: EvaluationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    advance_response(&service, id, WorkflowAction::GiveFeedback)
}

async fn close_for_signature_handler<T, R, N>(
    State(service): State<Arc<EvaluationService<T, R, N>>>,
    Path(id): Path<u64>,
) -> Response
where
    T: TemplateStore + 'static,
    R: EvaluationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    advance_response(&service, id, WorkflowAction::CloseForSignature)
}

async fn sign_handler<T, R, N>(
    State(service): State<Arc<EvaluationService<T, R, N>>>,
    Path(id): Path<u64>,
) -> Response
where
    T: TemplateStore + 'static,
    R: EvaluationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    advance_response(&service, id, WorkflowAction::Sign)
}

#[derive(Debug, Deserialize)]
struct DenyRequest {
    reason: String,
}

async fn deny_handler<T, R, N>(
    State(service): State<Arc<EvaluationService<T, R, N>>>,
    Path(id): Path<u64>,
    axum::Json(request): axum::Json<DenyRequest>,
) -> Response
where
    T: TemplateStore + 'static,
    R: EvaluationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    advance_response(
        &service,
        id,
        WorkflowAction::Deny {
            reason: request.reason,
        },
    )
}

async fn comparison_handler<T, R, N>(
    State(service): State<Arc<EvaluationService<T, R, N>>>,
    Path(id): Path<u64>,
) -> Response
where
    T: TemplateStore + 'static,
    R: EvaluationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.compare(EvaluationId(id)) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn backfill_self_handler<T, R, N>(
    State(service): State<Arc<EvaluationService<T, R, N>>>,
    Path(id): Path<u64>,
) -> Response
where
    T: TemplateStore + 'static,
    R: EvaluationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.backfill(EvaluationRef::SelfEvaluation(EvaluationId(id))) {
        Ok(version) => (
            StatusCode::OK,
            axum::Json(json!({ "snapshot_version": version })),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

async fn backfill_manager_handler<T, R, N>(
    State(service): State<Arc<EvaluationService<T, R, N>>>,
    Path(id): Path<u64>,
) -> Response
where
    T: TemplateStore + 'static,
    R: EvaluationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.backfill(EvaluationRef::ManagerEvaluation(EvaluationId(id))) {
        Ok(version) => (
            StatusCode::OK,
            axum::Json(json!({ "snapshot_version": version })),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

async fn backfill_sweep_handler<T, R, N>(
    State(service): State<Arc<EvaluationService<T, R, N>>>,
) -> Response
where
    T: TemplateStore + 'static,
    R: EvaluationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.backfill_missing() {
        Ok(summary) => (StatusCode::OK, axum::Json(summary)).into_response(),
        Err(error) => error_response(error),
    }
}
