use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use thiserror::Error;
use tollgate_billing::{BudgetError, LedgerError};
use tollgate_core::HttpError;

/// Failures of the reporting and budget routes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Budget(#[from] BudgetError),
}

impl HttpError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidQuery(_)
            | Self::Ledger(LedgerError::InvalidRange(_))
            | Self::Budget(BudgetError::InvalidLimit(_)) => StatusCode::BAD_REQUEST,
            Self::Ledger(_) | Self::Budget(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        if self.status_code() == StatusCode::BAD_REQUEST {
            "invalid_request_error"
        } else {
            "internal_error"
        }
    }

    fn client_message(&self) -> String {
        if self.status_code().is_server_error() {
            "cost ledger unavailable".to_owned()
        } else {
            self.to_string()
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "cost query failed");
        }

        let body = serde_json::json!({
            "error": {
                "message": self.client_message(),
                "type": self.error_type(),
            }
        });
        (status, Json(body)).into_response()
    }
}
