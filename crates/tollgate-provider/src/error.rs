use http::StatusCode;
use thiserror::Error;
use tollgate_core::UsageReference;

/// How the chain executor must react to a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Temporary overload or upstream throttling; retry the same model
    Transient,
    /// The request itself is invalid; neither retry nor fallback can help
    Permanent,
    /// The model cannot serve this request at all; skip to the next one
    ModelUnavailable,
}

impl ProviderErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::ModelUnavailable => "model_unavailable",
        }
    }
}

/// A failed provider call, tagged with its kind
#[derive(Debug, Error)]
#[error("{} provider error: {message}", kind.as_str())]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
    /// Usage reference the upstream returned despite failing, if any
    pub reference: Option<UsageReference>,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            reference: None,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Permanent, message)
    }

    pub fn model_unavailable(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::ModelUnavailable, message)
    }

    #[must_use]
    pub fn with_reference(mut self, reference: Option<UsageReference>) -> Self {
        self.reference = reference;
        self
    }

    /// Build from a non-success upstream response
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        Self::new(classify_status(status, body), format!("upstream returned {status}: {body}"))
    }
}

impl From<reqwest::Error> for ProviderError {
    /// Transport failures never say anything about the request itself
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::transient(format!("upstream call timed out: {e}"));
        }
        if e.is_builder() {
            return Self::permanent(format!("failed to build upstream request: {e}"));
        }
        Self::transient(format!("upstream request failed: {e}"))
    }
}

/// Phrases upstreams use when a model id is unknown or has no capacity route
const MODEL_UNAVAILABLE_MARKERS: &[&str] = &[
    "model_not_found",
    "model not found",
    "does not exist",
    "no endpoints found",
    "is not a valid model",
];

/// Map an upstream HTTP status (and body) onto an error kind
pub fn classify_status(status: StatusCode, body: &str) -> ProviderErrorKind {
    if status == StatusCode::NOT_FOUND {
        return ProviderErrorKind::ModelUnavailable;
    }

    if status.is_client_error() {
        let lower = body.to_ascii_lowercase();
        if MODEL_UNAVAILABLE_MARKERS.iter().any(|m| lower.contains(m)) {
            return ProviderErrorKind::ModelUnavailable;
        }
    }

    match status.as_u16() {
        408 | 409 | 425 | 429 => ProviderErrorKind::Transient,
        _ if status.is_server_error() => ProviderErrorKind::Transient,
        _ if status.is_client_error() => ProviderErrorKind::Permanent,
        _ => ProviderErrorKind::Transient,
    }
}
