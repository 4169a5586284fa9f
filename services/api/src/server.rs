use crate::cli::ServeArgs;
use crate::infra::{AppState, LoggingNotifier, UnconfiguredDirectory};
use crate::routes::with_recruitment_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use ta_recruitment::config::AppConfig;
use ta_recruitment::error::AppError;
use ta_recruitment::telemetry;
use ta_recruitment::workflows::recruitment::{
    InMemoryRecruitmentStore, RecruitmentService, StaticDocumentStatus,
};
use tracing::{info, warn};

/// Serves the recruitment API over the in-memory store.
///
/// The mailing-list and document collaborators are placeholders: `UnconfiguredDirectory`
/// resolves every list to no members, so advertisements reach nobody, and
/// `StaticDocumentStatus` reports every student's documents as pending. Swap them for
/// real clients before relying on advertisement mail or appointments.
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

    let recruitment_service = Arc::new(RecruitmentService::new(
        Arc::new(InMemoryRecruitmentStore::default()),
        Arc::new(LoggingNotifier),
        Arc::new(UnconfiguredDirectory),
        Arc::new(StaticDocumentStatus::default()),
        config.recruitment,
    ));

    warn!(
        "mailing-list directory and document store are not configured; \
         advertisements will have no recipients and documents stay pending"
    );

    let app = with_recruitment_routes(recruitment_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        undergraduate_hours = config.recruitment.undergraduate_hours,
        postgraduate_hours = config.recruitment.postgraduate_hours,
        "ta recruitment service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
