#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod bucket;
mod error;
mod limiter;

pub use error::RateLimitError;
pub use limiter::{Permit, RateLimiter};

use tollgate_config::RateLimitConfig;

/// Create the shared limiter from configuration
pub fn create_rate_limiter(config: &RateLimitConfig) -> Result<RateLimiter, RateLimitError> {
    RateLimiter::new(config)
}
