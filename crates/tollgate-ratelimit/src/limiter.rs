use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tollgate_config::RateLimitConfig;
use tollgate_telemetry::{Histogram, KeyValue, metrics};

use crate::bucket::TokenBucket;
use crate::error::RateLimitError;

/// Dual token-bucket limiter shared by every in-flight request
///
/// Each acquisition draws one unit from the request bucket and an estimated
/// volume from the volume bucket. Both draws happen under both locks, taken
/// in a fixed order, so a caller never holds one axis while starved on the
/// other.
pub struct RateLimiter {
    requests: Mutex<TokenBucket>,
    volume: Mutex<TokenBucket>,
    max_wait: Duration,
    wait_histogram: Histogram<f64>,
}

/// Outcome of a successful acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permit {
    /// Total time spent suspended before capacity was granted
    pub waited: Duration,
}

enum Attempt {
    Granted,
    Wait(Duration),
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Result<Self, RateLimitError> {
        let now = Instant::now();

        Ok(Self {
            requests: Mutex::new(TokenBucket::new(config.requests, now)?),
            volume: Mutex::new(TokenBucket::new(config.volume, now)?),
            max_wait: config.max_wait.get(),
            wait_histogram: metrics::meter()
                .f64_histogram(metrics::RATELIMIT_WAIT)
                .with_unit("s")
                .build(),
        })
    }

    /// Acquire capacity for one request of the given estimated volume
    ///
    /// Suspends while capacity refills. Fails with
    /// [`RateLimitError::Exceeded`] once the next wait would push the total
    /// past the configured maximum, and with
    /// [`RateLimitError::RequestTooLarge`] when `volume` exceeds what the
    /// volume bucket can ever hold.
    pub async fn acquire(&self, volume: u64) -> Result<Permit, RateLimitError> {
        self.check_size(volume)?;

        let started = Instant::now();
        loop {
            let wait = match self.try_acquire(volume) {
                Attempt::Granted => {
                    let waited = started.elapsed();
                    self.record_wait(waited, "granted");
                    return Ok(Permit { waited });
                }
                Attempt::Wait(wait) => wait,
            };

            let waited = started.elapsed();
            if waited + wait > self.max_wait {
                tracing::debug!(
                    volume,
                    waited_ms = waited.as_millis(),
                    retry_after_ms = wait.as_millis(),
                    "rate limit wait would exceed maximum"
                );
                self.record_wait(waited, "exceeded");
                return Err(RateLimitError::Exceeded { retry_after: wait });
            }

            tokio::time::sleep(wait).await;
        }
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn check_size(&self, volume: u64) -> Result<(), RateLimitError> {
        let capacity = lock(&self.volume).capacity();
        if volume as f64 > capacity {
            return Err(RateLimitError::RequestTooLarge {
                requested: volume,
                capacity: capacity as u64,
            });
        }
        Ok(())
    }

    /// Take both draws or neither
    #[allow(clippy::cast_precision_loss)]
    fn try_acquire(&self, volume: u64) -> Attempt {
        let now = Instant::now();
        let amount = volume as f64;

        let mut requests = lock(&self.requests);
        let mut volume_bucket = lock(&self.volume);
        requests.refill(now);
        volume_bucket.refill(now);

        let wait = requests.shortfall(1.0).max(volume_bucket.shortfall(amount));
        if !wait.is_zero() {
            return Attempt::Wait(wait);
        }

        requests.consume(1.0);
        volume_bucket.consume(amount);
        Attempt::Granted
    }

    fn record_wait(&self, waited: Duration, outcome: &'static str) {
        self.wait_histogram
            .record(waited.as_secs_f64(), &[KeyValue::new("outcome", outcome)]);
    }
}

fn lock(bucket: &Mutex<TokenBucket>) -> std::sync::MutexGuard<'_, TokenBucket> {
    bucket.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
