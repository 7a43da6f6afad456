use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, warn};

use super::service::{LoanValidationService, ValidationServiceError};
use super::source::LoanSource;

#[derive(Debug, Deserialize)]
pub(crate) struct NameRequest {
    #[serde(default)]
    pub(crate) loan_name: Option<String>,
    #[serde(default = "default_exact_match")]
    pub(crate) exact_match: bool,
}

fn default_exact_match() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatchRequest {
    #[serde(default)]
    pub(crate) loan_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchQuery {
    #[serde(default)]
    pub(crate) prefix: Option<String>,
}

/// Router builder exposing the validation and search endpoints.
pub fn validation_router<S>(service: Arc<LoanValidationService<S>>) -> Router
where
    S: LoanSource + 'static,
{
    Router::new()
        .route("/api/validate/id/:loan_id", get(validate_id_handler::<S>))
        .route("/api/validate/name", post(validate_name_handler::<S>))
        .route("/api/validate/record", post(validate_record_handler::<S>))
        .route("/api/validate/batch", post(validate_batch_handler::<S>))
        .route("/api/search", get(search_handler::<S>))
        .with_state(service)
}

pub(crate) async fn validate_id_handler<S>(
    State(service): State<Arc<LoanValidationService<S>>>,
    Path(loan_id): Path<String>,
) -> Response
where
    S: LoanSource + 'static,
{
    match service.validate_by_id(&loan_id) {
        Ok(verdict) => (StatusCode::OK, axum::Json(verdict)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn validate_name_handler<S>(
    State(service): State<Arc<LoanValidationService<S>>>,
    axum::Json(request): axum::Json<NameRequest>,
) -> Response
where
    S: LoanSource + 'static,
{
    let Some(loan_name) = request.loan_name.filter(|name| !name.trim().is_empty()) else {
        return bad_request("loan_name is required");
    };

    match service.validate_by_name(&loan_name, request.exact_match) {
        Ok(verdict) => (StatusCode::OK, axum::Json(verdict)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn validate_record_handler<S>(
    State(service): State<Arc<LoanValidationService<S>>>,
    axum::Json(payload): axum::Json<Value>,
) -> Response
where
    S: LoanSource + 'static,
{
    match service.validate_record(payload) {
        Ok(verdict) => (StatusCode::OK, axum::Json(verdict)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn validate_batch_handler<S>(
    State(service): State<Arc<LoanValidationService<S>>>,
    axum::Json(request): axum::Json<BatchRequest>,
) -> Response
where
    S: LoanSource + 'static,
{
    let loan_ids: Vec<String> = request
        .loan_ids
        .into_iter()
        .filter(|id| !id.trim().is_empty())
        .collect();
    if loan_ids.is_empty() {
        return bad_request("loan_ids must contain at least one loan ID");
    }

    let worker = Arc::clone(&service);
    match tokio::task::spawn_blocking(move || worker.validate_batch(&loan_ids)).await {
        Ok(results) => {
            let payload = json!({
                "total_loans": results.len(),
                "results": results,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(join_error) => {
            error!(error = %join_error, "batch validation task failed");
            let payload = json!({
                "error": format!("Internal server error: {join_error}"),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn search_handler<S>(
    State(service): State<Arc<LoanValidationService<S>>>,
    Query(query): Query<SearchQuery>,
) -> Response
where
    S: LoanSource + 'static,
{
    let Some(prefix) = query.prefix.filter(|prefix| !prefix.trim().is_empty()) else {
        return bad_request("prefix query parameter is required");
    };

    match service.search(&prefix) {
        Ok(loans) => {
            let payload = json!({
                "search_prefix": prefix,
                "count": loans.len(),
                "loans": loans,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

fn bad_request(message: &str) -> Response {
    let payload = json!({ "error": message });
    (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
}

fn error_response(err: ValidationServiceError) -> Response {
    match err {
        ValidationServiceError::Source(source) if source.is_lookup_failure() => {
            warn!(error = %source, "loan lookup failed");
            let payload = json!({ "error": source.to_string() });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        ValidationServiceError::Record(record) => {
            let payload = json!({ "error": format!("invalid loan payload: {record}") });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        ValidationServiceError::Source(source) => {
            error!(error = %source, "data source failure");
            let payload = json!({ "error": format!("Internal server error: {source}") });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}
