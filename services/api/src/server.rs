use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use evalflow::config::AppConfig;
use evalflow::error::AppError;
use evalflow::telemetry;
use evalflow::workflows::evaluation::EvaluationService;
use tracing::info;

use crate::cli::ServeArgs;
use crate::infra::{
    standard_templates, AppState, InMemoryEvaluationRepository, InMemoryTemplateStore,
    LoggingNotificationPublisher,
};
use crate::routes::with_evaluation_routes;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let templates = Arc::new(InMemoryTemplateStore::default());
    let (manager_template, self_template) = standard_templates();
    templates.insert(manager_template);
    templates.insert(self_template);

    let repository = Arc::new(InMemoryEvaluationRepository::default());
    let notifier = Arc::new(LoggingNotificationPublisher);
    let evaluation_service = Arc::new(EvaluationService::new(templates, repository, notifier));

    let app = with_evaluation_routes(evaluation_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "evaluation workflow service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
