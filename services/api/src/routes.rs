use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use deal_validator::validation::{validation_router, LoanSource, LoanValidationService};
use serde_json::json;
use std::sync::Arc;

const SERVICE_NAME: &str = "Deal Validator";

pub(crate) fn with_operational_routes<S>(service: Arc<LoanValidationService<S>>) -> axum::Router
where
    S: LoanSource + 'static,
{
    validation_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::tests::fixture_source;
    use axum::body::Body;
    use axum::http::Request;
    use axum::response::Response;
    use deal_validator::validation::RuleSet;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::Value;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    fn shipped_rules() -> Arc<RuleSet> {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../config/validation_rules.json");
        Arc::new(RuleSet::from_path(path).expect("shipped rules load"))
    }

    fn app_state(ready: bool) -> AppState {
        AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        }
    }

    fn app(state: AppState) -> axum::Router {
        let service = Arc::new(LoanValidationService::new(
            Arc::new(fixture_source()),
            shipped_rules(),
        ));
        with_operational_routes(service).layer(Extension(state))
    }

    async fn get(router: axum::Router, uri: &str) -> Response {
        router
            .oneshot(Request::get(uri).body(Body::empty()).expect("request builds"))
            .await
            .expect("route executes")
    }

    async fn read_json_body(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&body).expect("json payload")
    }

    #[tokio::test]
    async fn healthcheck_reports_service_and_version() {
        let Json(body) = healthcheck().await;
        assert_eq!(body["status"], json!("healthy"));
        assert_eq!(body["service"], json!("Deal Validator"));
        assert_eq!(body["version"], json!(env!("CARGO_PKG_VERSION")));
    }

    #[tokio::test]
    async fn readiness_follows_the_flag() {
        let state = app_state(false);
        let response = get(app(state.clone()), "/ready").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.readiness.store(true, Ordering::Release);
        let response = get(app(state), "/ready").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json_body(response).await, json!({ "status": "ready" }));
    }

    #[tokio::test]
    async fn metrics_are_rendered_as_text() {
        let response = get(app(app_state(true)), "/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
    }

    #[tokio::test]
    async fn validation_routes_are_mounted() {
        let response = get(app(app_state(true)), "/api/validate/id/a0i5G00000CVMZ1QAP").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json_body(response).await;
        assert_eq!(body["LOAN_NAME"], json!("Canyon Valley - Mezz"));
        assert_eq!(body["validation_passed"], json!(true));
    }

    #[tokio::test]
    async fn search_route_hides_excluded_loans() {
        let response = get(app(app_state(true)), "/api/search?prefix=harbor").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json_body(response).await;
        assert_eq!(body["count"], json!(0));
        assert_eq!(body["loans"], json!([]));
    }
}
