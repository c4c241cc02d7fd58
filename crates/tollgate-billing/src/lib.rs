//! Cost accounting for Tollgate
//!
//! Finished chains are handed to a bounded reconciliation queue. Workers
//! resolve authoritative usage from the provider, append the resulting
//! `CostEvent` to the ledger, publish it, and re-check budget thresholds.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod error;
pub mod ledger;
pub mod monitor;
pub mod queries;
pub mod queue;
pub mod reconciler;
pub mod store;

pub use error::{BudgetError, LedgerError};
pub use ledger::{CostLedger, GroupBy, Summary, Totals};
pub use monitor::BudgetMonitor;
pub use queries::{CostQueries, PeriodCost};
pub use queue::{CostPipeline, QueueWorkers, ReconcileQueue};
pub use reconciler::{ReconcileJob, UsageReconciler};
pub use store::{CostStore, MemoryStore};
