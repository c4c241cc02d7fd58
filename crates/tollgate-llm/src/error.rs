use std::fmt;
use std::time::Duration;

use http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tollgate_core::HttpError;
use tollgate_provider::ProviderErrorKind;

/// Why one model in the chain gave up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelFailure {
    /// Model as `provider/model`
    pub model: String,
    pub attempts: u32,
    /// Kind of the last error from this model
    pub kind: &'static str,
    /// Message of the last error from this model
    pub reason: String,
}

impl ModelFailure {
    pub(crate) fn new(model: impl Into<String>, attempts: u32, kind: ProviderErrorKind, reason: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            attempts,
            kind: kind.as_str(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ModelFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} after {} attempt(s)): {}",
            self.model, self.kind, self.attempts, self.reason
        )
    }
}

fn join(failures: &[ModelFailure]) -> String {
    failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// The single terminal error a chain caller receives
#[derive(Debug, Error)]
pub enum ChainError {
    /// The request is invalid; retrying or switching models cannot help
    #[error("request rejected by {model}: {message}")]
    PermanentRequest { model: String, message: String },

    /// Every model in the chain was exhausted
    #[error("all models in chain unavailable: {}", join(.failures))]
    AllModelsUnavailable { failures: Vec<ModelFailure> },

    /// Capacity did not free up within the configured maximum wait
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// The overall deadline expired before any model succeeded
    #[error("chain deadline exceeded after {elapsed:?}")]
    Timeout {
        elapsed: Duration,
        failures: Vec<ModelFailure>,
    },

    #[error("unknown chain: {0}")]
    UnknownChain(String),
}

/// A chain entry with no registered provider behind it
#[derive(Debug, Error)]
#[error("chain '{chain}' references unresolvable model '{model}'")]
pub struct UnresolvedModel {
    pub chain: String,
    pub model: String,
}

impl HttpError for ChainError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::PermanentRequest { .. } => StatusCode::BAD_REQUEST,
            Self::AllModelsUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::UnknownChain(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::PermanentRequest { .. } => "invalid_request_error",
            Self::AllModelsUnavailable { .. } => "models_unavailable_error",
            Self::RateLimited { .. } => "rate_limit_error",
            Self::Timeout { .. } => "timeout_error",
            Self::UnknownChain(_) => "not_found_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::AllModelsUnavailable { failures } => {
                format!("all {} model(s) in the chain failed", failures.len())
            }
            other => other.to_string(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::AllModelsUnavailable { failures } | Self::Timeout { failures, .. } => {
                Some(serde_json::json!({ "failures": failures }))
            }
            Self::RateLimited { retry_after } => {
                let retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX);
                Some(serde_json::json!({ "retry_after_ms": retry_after_ms }))
            }
            Self::PermanentRequest { .. } | Self::UnknownChain(_) => None,
        }
    }
}
