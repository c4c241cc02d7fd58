use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tollgate_core::{CostEvent, Period, PeriodKind, TimeRange};

use super::CostStore;
use crate::error::LedgerError;

/// In-process store for single-instance deployments and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    events: Vec<CostEvent>,
    totals: HashMap<Period, Decimal>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl CostStore for MemoryStore {
    async fn insert(&self, event: CostEvent) -> Result<(), LedgerError> {
        let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);

        for kind in PeriodKind::ALL {
            *inner
                .totals
                .entry(Period::containing(kind, event.timestamp))
                .or_insert(Decimal::ZERO) += event.cost;
        }
        inner.events.push(event);

        Ok(())
    }

    async fn scan(&self, range: TimeRange) -> Result<Vec<CostEvent>, LedgerError> {
        Ok(self
            .read()
            .events
            .iter()
            .filter(|e| range.contains(e.timestamp))
            .cloned()
            .collect())
    }

    async fn period_total(&self, period: Period) -> Result<Decimal, LedgerError> {
        Ok(self.read().totals.get(&period).copied().unwrap_or(Decimal::ZERO))
    }
}
