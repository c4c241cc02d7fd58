#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod billing;
pub mod chain;
mod duration;
mod env;
mod loader;
pub mod provider;
pub mod rate_limit;
pub mod server;
pub mod telemetry;

use indexmap::IndexMap;
use serde::Deserialize;

pub use billing::*;
pub use chain::*;
pub use duration::HumanDuration;
pub use provider::*;
pub use rate_limit::*;
pub use server::*;
pub use telemetry::*;

/// Top-level tollgate configuration
///
/// Loaded once at startup. Only budget thresholds may change afterwards,
/// and those live in the budget monitor, not here.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream providers keyed by name
    #[serde(default)]
    pub providers: IndexMap<String, ProviderConfig>,
    /// Named model chains
    #[serde(default)]
    pub chains: IndexMap<String, ChainConfig>,
    /// Dual token-bucket throughput limits
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Cost accounting and budget thresholds
    #[serde(default)]
    pub billing: BillingConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
