use std::time::Duration;

use thiserror::Error;

/// Rate limiting errors
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Configuration error
    #[error("rate limit configuration error: {0}")]
    Config(String),

    /// Capacity did not free up within the maximum wait
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    Exceeded {
        /// Estimated time until enough capacity is available
        retry_after: Duration,
    },

    /// The request needs more than a full bucket and can never be admitted
    #[error("request needs {requested} units but the volume bucket holds at most {capacity}")]
    RequestTooLarge { requested: u64, capacity: u64 },
}
