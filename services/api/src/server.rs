use crate::cli::ServeArgs;
use crate::infra::{build_engine, seed_demo_catalog, AppState, LoggingSender};
use crate::routes::with_engine_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use coursehub::config::{AppConfig, AppEnvironment};
use coursehub::error::AppError;
use coursehub::telemetry;
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

    let engine = build_engine(config.billing.platform_fee_bps, Arc::new(LoggingSender));
    if config.environment == AppEnvironment::Development {
        seed_demo_catalog(&engine);
        info!("development catalog seeded");
    }

    let app = with_engine_routes(engine.context)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "access and approval engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}
