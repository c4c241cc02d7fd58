use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tollgate_core::{Accuracy, CostEvent, Period, TimeRange};

use crate::error::LedgerError;
use crate::store::CostStore;

/// Dimension to break a summary down by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Model,
    CallerCategory,
    CallerIdentity,
    Tenant,
}

impl GroupBy {
    fn key(self, event: &CostEvent) -> String {
        match self {
            Self::Model => event.model.clone(),
            Self::CallerCategory => event.caller_category.clone(),
            Self::CallerIdentity => event.caller_identity.clone(),
            Self::Tenant => event.tenant.clone().unwrap_or_else(|| "unattributed".to_owned()),
        }
    }
}

/// Totals for one slice of events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub cost: Decimal,
    pub input_units: u64,
    pub output_units: u64,
    pub events: u64,
    /// Events whose figures are estimates
    pub degraded: u64,
}

impl Totals {
    fn add(&mut self, event: &CostEvent) {
        self.cost += event.cost;
        self.input_units += event.input_units;
        self.output_units += event.output_units;
        self.events += 1;
        if event.accuracy == Accuracy::Degraded {
            self.degraded += 1;
        }
    }
}

/// Result of a range aggregation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub range: TimeRange,
    #[serde(flatten)]
    pub totals: Totals,
    /// Per-group totals, empty when no grouping was requested
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub groups: BTreeMap<String, Totals>,
}

/// Append-only cost record with read-side aggregation
///
/// Aggregation is a pure read. Events are bucketed by their own timestamp,
/// never by when they were inserted.
#[derive(Clone)]
pub struct CostLedger {
    store: Arc<dyn CostStore>,
}

impl CostLedger {
    pub fn new(store: Arc<dyn CostStore>) -> Self {
        Self { store }
    }

    pub async fn insert(&self, event: CostEvent) -> Result<(), LedgerError> {
        self.store.insert(event).await
    }

    pub async fn aggregate(&self, range: TimeRange, group_by: Option<GroupBy>) -> Result<Summary, LedgerError> {
        let events = self.store.scan(range).await?;

        let mut summary = Summary {
            range,
            totals: Totals::default(),
            groups: BTreeMap::new(),
        };

        for event in &events {
            summary.totals.add(event);
            if let Some(group_by) = group_by {
                summary.groups.entry(group_by.key(event)).or_default().add(event);
            }
        }

        Ok(summary)
    }

    /// Raw events in a range, for audit and export
    pub async fn events(&self, range: TimeRange) -> Result<Vec<CostEvent>, LedgerError> {
        let mut events = self.store.scan(range).await?;
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    pub async fn current_period_total(&self, period: Period) -> Result<Decimal, LedgerError> {
        self.store.period_total(period).await
    }
}

impl std::fmt::Debug for CostLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostLedger").finish_non_exhaustive()
    }
}
