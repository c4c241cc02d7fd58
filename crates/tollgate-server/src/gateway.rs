use std::sync::Arc;

use tokio::sync::broadcast;
use tollgate_billing::{
    BudgetMonitor, CostLedger, CostPipeline, CostQueries, MemoryStore, QueueWorkers, ReconcileQueue,
    UsageReconciler,
};
use tollgate_config::Config;
use tollgate_core::{BroadcastBus, EventSink, GatewayEvent};
use tollgate_llm::ModelChainExecutor;
use tollgate_provider::ProviderRegistry;

/// Every long-lived component, wired together
///
/// Must be built inside a tokio runtime: the reconciliation workers and the
/// event log are spawned here.
pub struct Gateway {
    executor: Arc<ModelChainExecutor>,
    queries: CostQueries,
    bus: BroadcastBus,
    workers: QueueWorkers,
}

impl Gateway {
    /// Build the limiter, cost pipeline and executor over already-checked providers
    ///
    /// # Errors
    ///
    /// Returns an error if the rate-limit settings are unusable or a chain
    /// names a provider that is not registered
    pub fn build(config: &Config, providers: &ProviderRegistry) -> anyhow::Result<Self> {
        let billing = &config.billing;

        let bus = BroadcastBus::new(billing.event_buffer);
        let sink: Arc<dyn EventSink> = Arc::new(bus.clone());
        spawn_event_log(bus.subscribe());

        let ledger = CostLedger::new(Arc::new(MemoryStore::new()));
        let monitor = Arc::new(BudgetMonitor::new(ledger.clone(), Arc::clone(&sink), &billing.thresholds));
        let backoff = billing.lookup_backoff.iter().map(|d| d.get()).collect();
        let reconciler = UsageReconciler::new(providers.clone(), backoff);

        let pipeline = Arc::new(CostPipeline::new(reconciler, ledger.clone(), sink, Arc::clone(&monitor)));
        let (queue, workers) = ReconcileQueue::start(pipeline, billing.queue_capacity, billing.workers);

        let limiter = Arc::new(tollgate_ratelimit::create_rate_limiter(&config.rate_limit)?);
        let executor = Arc::new(ModelChainExecutor::new(config, providers, limiter, queue)?);

        tracing::info!(
            chains = executor.chains().count(),
            workers = billing.workers,
            queue_capacity = billing.queue_capacity,
            "gateway components ready"
        );

        Ok(Self {
            executor,
            queries: CostQueries::new(ledger, monitor),
            bus,
            workers,
        })
    }

    pub const fn executor(&self) -> &Arc<ModelChainExecutor> {
        &self.executor
    }

    pub const fn queries(&self) -> &CostQueries {
        &self.queries
    }

    /// Subscribe to `cost.recorded` and `cost.threshold_exceeded` events
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.bus.subscribe()
    }

    /// Stop accepting chain runs and wait for queued cost jobs to land
    ///
    /// Call after the server has stopped so no router still holds the
    /// executor.
    pub async fn shutdown(self) {
        let Self { executor, workers, .. } = self;
        if Arc::strong_count(&executor) > 1 {
            tracing::warn!("executor still referenced at shutdown; draining what is queued");
        }
        drop(executor);
        workers.drain().await;
    }
}

fn spawn_event_log(mut rx: broadcast::Receiver<GatewayEvent>) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(GatewayEvent::CostRecorded(event)) => tracing::debug!(
                    model = %event.model,
                    cost = %event.cost,
                    accuracy = event.accuracy.as_str(),
                    correlation_id = %event.correlation_id,
                    "cost recorded"
                ),
                // the monitor already warned when it raised this
                Ok(GatewayEvent::ThresholdExceeded(breach)) => tracing::debug!(
                    period = %breach.period,
                    limit = %breach.limit,
                    total = %breach.total,
                    "threshold event published"
                ),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event log fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
