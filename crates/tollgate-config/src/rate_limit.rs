use std::time::Duration;

use serde::Deserialize;

use crate::HumanDuration;

/// Dual token-bucket rate limiting configuration
///
/// Every model attempt must draw one unit from `requests` and its estimated
/// volume from `volume`. Callers wait for capacity up to `max_wait`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Longest a caller may wait for capacity before failing
    #[serde(default = "default_max_wait")]
    pub max_wait: HumanDuration,
    /// Requests per window
    #[serde(default = "default_requests")]
    pub requests: BucketConfig,
    /// Units (tokens) per window
    #[serde(default = "default_volume")]
    pub volume: BucketConfig,
    /// Output volume assumed when a request does not bound its output
    #[serde(default = "default_output_units")]
    pub default_output_units: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_wait: default_max_wait(),
            requests: default_requests(),
            volume: default_volume(),
            default_output_units: default_output_units(),
        }
    }
}

/// A single bucket: `capacity` units refilled evenly across `window`
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketConfig {
    pub capacity: u64,
    pub window: HumanDuration,
}

impl BucketConfig {
    /// Refill rate in units per second
    #[allow(clippy::cast_precision_loss)]
    pub fn refill_per_sec(&self) -> f64 {
        let window = self.window.get();
        if window.is_zero() {
            return 0.0;
        }
        self.capacity as f64 / window.as_secs_f64()
    }

    pub fn window(&self) -> Duration {
        self.window.get()
    }
}

const fn default_max_wait() -> HumanDuration {
    HumanDuration::from_secs(5)
}

const fn default_requests() -> BucketConfig {
    BucketConfig {
        capacity: 600,
        window: HumanDuration::from_secs(60),
    }
}

const fn default_volume() -> BucketConfig {
    BucketConfig {
        capacity: 1_000_000,
        window: HumanDuration::from_secs(60),
    }
}

const fn default_output_units() -> u64 {
    1024
}
