use crate::cli::ServeArgs;
use crate::infra::{build_service, spawn_completion_sweep, AppState};
use crate::routes::with_booking_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use booking_engine::config::AppConfig;
use booking_engine::error::AppError;
use booking_engine::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

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

    let booking_service = build_service(&config)?;
    if let Some(every) = config.booking.completion_sweep {
        info!(interval_secs = every.as_secs(), "completion sweep scheduled");
        spawn_completion_sweep(booking_service.clone(), every);
    }
    let gateway = booking_service.gateway_name();

    let app = with_booking_routes(booking_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, gateway, "booking engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}
