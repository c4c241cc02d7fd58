//! Axum route for running a chain

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use tollgate_core::{HttpError, RequestContext};
use tollgate_provider::InferenceRequest;

use crate::error::ChainError;
use crate::executor::ModelChainExecutor;

/// Caller-supplied overall deadline in milliseconds
pub const DEADLINE_HEADER: &str = "x-deadline-ms";
/// Model that produced the response
pub const MODEL_USED_HEADER: &str = "x-tollgate-model";
/// Attempts beyond the first
pub const RETRY_COUNT_HEADER: &str = "x-tollgate-retries";

/// Build the chain completion router
pub fn chain_router(executor: Arc<ModelChainExecutor>) -> Router {
    Router::new()
        .route("/v1/chains/{chain}/completions", routing::post(chain_completions))
        .with_state(executor)
}

/// Handle `POST /v1/chains/{chain}/completions`
async fn chain_completions(
    State(executor): State<Arc<ModelChainExecutor>>,
    Path(chain): Path<String>,
    axum::Extension(context): axum::Extension<RequestContext>,
    headers: HeaderMap,
    Json(request): Json<InferenceRequest>,
) -> Response {
    let deadline = match deadline_from(&headers) {
        Ok(deadline) => deadline,
        Err(message) => return error_body(axum::http::StatusCode::BAD_REQUEST, "invalid_request_error", &message, None),
    };

    match executor.execute(&chain, request, context, deadline).await {
        Ok(outcome) => {
            let mut response = Json(outcome.response.body).into_response();
            let headers = response.headers_mut();
            if let Ok(model) = HeaderValue::from_str(&outcome.model_used) {
                headers.insert(MODEL_USED_HEADER, model);
            }
            headers.insert(RETRY_COUNT_HEADER, HeaderValue::from(outcome.retry_count));
            response
        }
        Err(e) => error_response(&e),
    }
}

fn deadline_from(headers: &HeaderMap) -> Result<Option<Duration>, String> {
    let Some(value) = headers.get(DEADLINE_HEADER) else {
        return Ok(None);
    };

    let millis = value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .ok_or_else(|| format!("{DEADLINE_HEADER} must be a positive integer"))?;

    Ok(Some(Duration::from_millis(millis)))
}

fn error_response(error: &ChainError) -> Response {
    let mut response = error_body(
        error.status_code(),
        error.error_type(),
        &error.client_message(),
        error.details(),
    );

    if let ChainError::RateLimited { retry_after } = error {
        let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
        response
            .headers_mut()
            .insert(axum::http::header::RETRY_AFTER, HeaderValue::from(secs));
    }

    response
}

fn error_body(
    status: axum::http::StatusCode,
    error_type: &str,
    message: &str,
    details: Option<serde_json::Value>,
) -> Response {
    let mut error = serde_json::json!({
        "message": message,
        "type": error_type,
    });
    if let Some(details) = details {
        error["details"] = details;
    }

    (status, Json(serde_json::json!({ "error": error }))).into_response()
}
