use std::time::Duration;

use tokio::time::Instant;
use tollgate_config::BucketConfig;

use crate::error::RateLimitError;

/// A lazily refilled token bucket
///
/// There is no ticking task: every inspection first credits the tokens
/// accrued since the previous one, capped at `capacity`.
#[derive(Debug)]
pub(crate) struct TokenBucket {
    capacity: f64,
    level: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn new(config: BucketConfig, now: Instant) -> Result<Self, RateLimitError> {
        if config.capacity == 0 {
            return Err(RateLimitError::Config("bucket capacity must be > 0".to_string()));
        }
        if config.window().is_zero() {
            return Err(RateLimitError::Config("bucket window must be > 0".to_string()));
        }

        Ok(Self {
            capacity: config.capacity as f64,
            level: config.capacity as f64,
            refill_per_sec: config.refill_per_sec(),
            last_refill: now,
        })
    }

    pub(crate) fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.level = (self.level + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Time until `amount` tokens are available, zero when they already are
    pub(crate) fn shortfall(&self, amount: f64) -> Duration {
        if self.level >= amount {
            return Duration::ZERO;
        }
        Duration::from_secs_f64((amount - self.level) / self.refill_per_sec)
    }

    pub(crate) fn consume(&mut self, amount: f64) {
        debug_assert!(self.level >= amount);
        self.level -= amount;
    }

    pub(crate) const fn capacity(&self) -> f64 {
        self.capacity
    }

    #[cfg(test)]
    pub(crate) const fn level(&self) -> f64 {
        self.level
    }
}
