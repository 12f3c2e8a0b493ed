use crate::cli::ServeArgs;
use crate::infra::{in_memory_service, AppState};
use crate::routes::with_admissions_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::{Datelike, Utc};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use ucaes_admissions::config::AppConfig;
use ucaes_admissions::error::AppError;
use ucaes_admissions::telemetry;

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

    let start_year = args
        .academic_year_start
        .unwrap_or_else(|| current_intake_start(Utc::now().year()));
    let (service, _portal) = in_memory_service(config.admissions.settings(), start_year)?;
    let (resolved, year_key) = service.current_year_key()?;

    let app = with_admissions_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        admission_year = %resolved.year,
        %year_key,
        "admissions service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

/// Academic years start in the autumn; intake for `year` opens against `year-1/year`.
fn current_intake_start(calendar_year: i32) -> u16 {
    u16::try_from(calendar_year.saturating_sub(1)).unwrap_or(2025)
}
