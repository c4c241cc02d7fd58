//! Shared domain types for the tollgate gateway core
//!
//! Everything that crosses a crate boundary lives here: the cost record
//! written to the ledger, caller context, billing periods, and the event
//! bus contract.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod context;
mod cost;
mod error;
pub mod events;
mod period;

pub use context::RequestContext;
pub use cost::{Accuracy, CostEvent, UsageEstimate, UsageRecord, UsageReference};
pub use error::HttpError;
pub use events::{BroadcastBus, EventSink, GatewayEvent, ThresholdBreach};
pub use period::{Period, PeriodKind, TimeRange};
