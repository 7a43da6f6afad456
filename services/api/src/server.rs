use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryLoanSource};
use crate::routes::with_operational_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use deal_validator::config::AppConfig;
use deal_validator::error::AppError;
use deal_validator::telemetry;
use deal_validator::validation::{LoanValidationService, RuleSet};
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

    let rules = Arc::new(RuleSet::from_path(&config.validation.rules_path)?);
    info!(
        path = %config.validation.rules_path.display(),
        rules = rules.len(),
        "rule store loaded"
    );
    let source = InMemoryLoanSource::load(config.validation.loans_path.as_deref())?;
    info!(loans = source.len(), "loan source ready");

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let service = Arc::new(LoanValidationService::new(Arc::new(source), rules));
    let app = with_operational_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "deal validator ready");

    axum::serve(listener, app).await?;
    Ok(())
}
