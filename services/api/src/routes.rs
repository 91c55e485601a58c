use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use evalflow::workflows::evaluation::{
    evaluation_router, EvaluationRepository, EvaluationService, NotificationPublisher,
    TemplateStore,
};
use serde_json::json;

use crate::infra::AppState;

pub(crate) fn with_evaluation_routes<T, R, N>(
    service: Arc<EvaluationService<T, R, N>>,
) -> axum::Router
where
    T: TemplateStore + 'static,
    R: EvaluationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    evaluation_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    if state.readiness.load(Ordering::Acquire) {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "starting" })),
        )
    }
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    state.metrics.render()
}
