//! Metric names and the shared meter
//!
//! Instruments resolve against the global meter provider, so they are
//! no-ops until [`crate::init`] installs an exporter.

use opentelemetry::{global, metrics::Meter};

/// Attempts dispatched to a provider, labelled by model and outcome
pub const CHAIN_ATTEMPTS: &str = "tollgate.chain.attempts";
/// Chain walks that advanced past their primary model
pub const CHAIN_FALLBACKS: &str = "tollgate.chain.fallbacks";
/// Seconds a caller waited on the rate limiter
pub const RATELIMIT_WAIT: &str = "tollgate.ratelimit.wait";
/// Cost entries written to the ledger, labelled by accuracy
pub const COST_RECORDED: &str = "tollgate.cost.recorded";
/// Cost entries that fell back to an estimate
pub const COST_DEGRADED: &str = "tollgate.cost.degraded";
/// Jobs dropped because the reconciliation queue and its overflow were full
pub const COST_DROPPED: &str = "tollgate.cost.dropped";
/// Budget threshold breaches emitted
pub const BUDGET_ALERTS: &str = "tollgate.budget.alerts";

pub fn meter() -> Meter {
    global::meter("tollgate")
}
