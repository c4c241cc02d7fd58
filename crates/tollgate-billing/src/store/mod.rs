//! Persistence contract for cost events

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tollgate_core::{CostEvent, Period, TimeRange};

use crate::error::LedgerError;

/// Append-only store of cost events
///
/// Implementations must make each `insert` atomic, including its
/// contribution to the running period totals.
#[async_trait]
pub trait CostStore: Send + Sync {
    async fn insert(&self, event: CostEvent) -> Result<(), LedgerError>;

    /// Every event whose own timestamp falls in `range`, in no particular order
    async fn scan(&self, range: TimeRange) -> Result<Vec<CostEvent>, LedgerError>;

    /// Running total for a day or month
    async fn period_total(&self, period: Period) -> Result<Decimal, LedgerError>;
}
