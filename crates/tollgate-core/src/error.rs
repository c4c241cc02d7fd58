use http::StatusCode;

/// Domain errors that the server layer renders as HTTP responses
///
/// Chain execution and query errors implement this so the HTTP surface can
/// map them without those crates depending on axum.
pub trait HttpError: std::error::Error {
    /// HTTP status code for this error
    fn status_code(&self) -> StatusCode;

    /// Machine-readable error type (e.g. `rate_limit_error`)
    fn error_type(&self) -> &str;

    /// Message safe to expose to API consumers
    fn client_message(&self) -> String;

    /// Structured detail attached to the error body, if any
    fn details(&self) -> Option<serde_json::Value> {
        None
    }
}
