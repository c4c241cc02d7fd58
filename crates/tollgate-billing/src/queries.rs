//! Read-side operations exposed to reporting, plus live threshold updates

use std::sync::Arc;

use jiff::Timestamp;
use rust_decimal::Decimal;
use serde::Serialize;
use tollgate_core::{Period, PeriodKind, ThresholdBreach, TimeRange};

use crate::error::{BudgetError, LedgerError};
use crate::ledger::{CostLedger, GroupBy, Summary};
use crate::monitor::BudgetMonitor;

/// Spend so far in one period
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodCost {
    pub period: Period,
    pub period_key: String,
    pub total: Decimal,
    /// Configured limit for this period kind, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct CostQueries {
    ledger: CostLedger,
    monitor: Arc<BudgetMonitor>,
}

impl CostQueries {
    pub const fn new(ledger: CostLedger, monitor: Arc<BudgetMonitor>) -> Self {
        Self { ledger, monitor }
    }

    pub async fn cost_today(&self, now: Timestamp) -> Result<PeriodCost, LedgerError> {
        let period = Period::containing(PeriodKind::Daily, now);
        let total = self.ledger.current_period_total(period).await?;
        let limit = self
            .monitor
            .thresholds()
            .into_iter()
            .find_map(|(kind, limit)| (kind == PeriodKind::Daily).then_some(limit));

        Ok(PeriodCost {
            period,
            period_key: period.key(),
            total,
            limit,
        })
    }

    pub async fn cost_by_model(&self, range: TimeRange) -> Result<Summary, LedgerError> {
        self.ledger.aggregate(range, Some(GroupBy::Model)).await
    }

    pub async fn cost_by_category(&self, range: TimeRange) -> Result<Summary, LedgerError> {
        self.ledger.aggregate(range, Some(GroupBy::CallerCategory)).await
    }

    pub async fn breached(&self, now: Timestamp) -> Result<Vec<ThresholdBreach>, LedgerError> {
        self.monitor.breached(now).await
    }

    /// Currently configured limits, daily first
    pub fn thresholds(&self) -> Vec<(PeriodKind, Decimal)> {
        self.monitor.thresholds()
    }

    pub fn update_threshold(&self, kind: PeriodKind, limit: Option<Decimal>) -> Result<(), BudgetError> {
        self.monitor.update_threshold(kind, limit)
    }
}
