use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use jiff::Timestamp;
use rust_decimal::Decimal;
use tollgate_config::ThresholdsConfig;
use tollgate_core::{CostEvent, EventSink, GatewayEvent, Period, PeriodKind, ThresholdBreach};
use tollgate_telemetry::{Counter, KeyValue, metrics};

use crate::error::{BudgetError, LedgerError};
use crate::ledger::CostLedger;

/// Alert bookkeeping for the most recent period seen of one kind
#[derive(Debug, Clone, Copy)]
struct AlertState {
    period: Period,
    alerted: bool,
}

/// Emits at most one breach per (period, threshold)
///
/// The running total is read from the ledger after each event lands. The
/// comparison against the limit and the setting of the alerted mark happen
/// under one lock, so concurrent events crossing the limit together produce
/// a single alert.
pub struct BudgetMonitor {
    ledger: CostLedger,
    sink: Arc<dyn EventSink>,
    thresholds: RwLock<HashMap<PeriodKind, Decimal>>,
    alerts: Mutex<HashMap<PeriodKind, AlertState>>,
    alert_counter: Counter<u64>,
}

impl BudgetMonitor {
    pub fn new(ledger: CostLedger, sink: Arc<dyn EventSink>, config: &ThresholdsConfig) -> Self {
        let thresholds = [(PeriodKind::Daily, config.daily), (PeriodKind::Monthly, config.monthly)]
            .into_iter()
            .filter_map(|(kind, limit)| limit.map(|l| (kind, l)))
            .collect();

        Self {
            ledger,
            sink,
            thresholds: RwLock::new(thresholds),
            alerts: Mutex::new(HashMap::new()),
            alert_counter: metrics::meter().u64_counter(metrics::BUDGET_ALERTS).build(),
        }
    }

    /// Re-evaluate thresholds after `event` was written to the ledger
    pub async fn observe(&self, event: &CostEvent) -> Result<Vec<ThresholdBreach>, LedgerError> {
        let mut breaches = Vec::new();

        for (kind, limit) in self.thresholds() {
            let period = Period::containing(kind, event.timestamp);
            let total = self.ledger.current_period_total(period).await?;

            if self.mark_if_crossed(kind, period, total, limit) {
                breaches.push(ThresholdBreach {
                    period,
                    period_key: period.key(),
                    limit,
                    total,
                    detected_at: Timestamp::now(),
                });
            }
        }

        for breach in &breaches {
            tracing::warn!(
                period = %breach.period,
                limit = %breach.limit,
                total = %breach.total,
                "budget threshold exceeded"
            );
            self.alert_counter
                .add(1, &[KeyValue::new("period", breach.period.kind.as_str())]);
            self.sink.publish(GatewayEvent::ThresholdExceeded(breach.clone())).await;
        }

        Ok(breaches)
    }

    /// Compare-and-set on the alert mark; true when this call owns the alert
    fn mark_if_crossed(&self, kind: PeriodKind, period: Period, total: Decimal, limit: Decimal) -> bool {
        let mut alerts = self.alerts.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let state = alerts.entry(kind).or_insert(AlertState { period, alerted: false });

        if period > state.period {
            *state = AlertState { period, alerted: false };
        } else if period < state.period {
            // late arrival for a period that has already rolled over
            return false;
        }

        if state.alerted || total < limit {
            return false;
        }
        state.alerted = true;
        true
    }

    /// Replace (or remove, with `None`) the limit for a period kind
    ///
    /// Clears the alert mark for the current period so a new limit that is
    /// already exceeded alerts on the next event.
    pub fn update_threshold(&self, kind: PeriodKind, limit: Option<Decimal>) -> Result<(), BudgetError> {
        if let Some(limit) = limit
            && limit <= Decimal::ZERO
        {
            return Err(BudgetError::InvalidLimit(limit));
        }

        {
            let mut thresholds = self.thresholds.write().unwrap_or_else(std::sync::PoisonError::into_inner);
            match limit {
                Some(limit) => thresholds.insert(kind, limit),
                None => thresholds.remove(&kind),
            };
        }

        let mut alerts = self.alerts.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(state) = alerts.get_mut(&kind) {
            state.alerted = false;
        }

        tracing::info!(period = %kind, limit = ?limit, "budget threshold updated");
        Ok(())
    }

    /// Configured limits, daily first
    pub fn thresholds(&self) -> Vec<(PeriodKind, Decimal)> {
        let thresholds = self.thresholds.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        PeriodKind::ALL
            .into_iter()
            .filter_map(|kind| thresholds.get(&kind).map(|limit| (kind, *limit)))
            .collect()
    }

    /// Thresholds whose current-period total meets or exceeds the limit at `now`
    pub async fn breached(&self, now: Timestamp) -> Result<Vec<ThresholdBreach>, LedgerError> {
        let mut breached = Vec::new();

        for (kind, limit) in self.thresholds() {
            let period = Period::containing(kind, now);
            let total = self.ledger.current_period_total(period).await?;
            if total >= limit {
                breached.push(ThresholdBreach {
                    period,
                    period_key: period.key(),
                    limit,
                    total,
                    detected_at: now,
                });
            }
        }

        Ok(breached)
    }
}

impl std::fmt::Debug for BudgetMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetMonitor")
            .field("thresholds", &self.thresholds())
            .finish_non_exhaustive()
    }
}
