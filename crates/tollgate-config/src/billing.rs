use rust_decimal::Decimal;
use serde::Deserialize;

use crate::HumanDuration;

/// Cost accounting configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BillingConfig {
    /// Bounded capacity of the reconciliation queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Number of reconciliation workers draining the queue
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Delays between usage lookups while the provider has no record yet.
    /// The first lookup is immediate; exhausting this list degrades the entry.
    #[serde(default = "default_lookup_backoff")]
    pub lookup_backoff: Vec<HumanDuration>,
    /// Capacity of the in-process event bus
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Spend limits per accounting period
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            workers: default_workers(),
            lookup_backoff: default_lookup_backoff(),
            event_buffer: default_event_buffer(),
            thresholds: ThresholdsConfig::default(),
        }
    }
}

/// Initial daily and monthly spend limits, adjustable at runtime
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdsConfig {
    #[serde(default)]
    pub daily: Option<Decimal>,
    #[serde(default)]
    pub monthly: Option<Decimal>,
}

const fn default_queue_capacity() -> usize {
    1024
}

const fn default_workers() -> usize {
    4
}

const fn default_event_buffer() -> usize {
    256
}

fn default_lookup_backoff() -> Vec<HumanDuration> {
    vec![
        HumanDuration::from_millis(250),
        HumanDuration::from_millis(500),
        HumanDuration::from_secs(1),
        HumanDuration::from_secs(2),
    ]
}
