//! Bounded work queue between the chain executor and cost accounting

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tollgate_core::{EventSink, GatewayEvent};
use tollgate_telemetry::{Counter, KeyValue, metrics};

use crate::ledger::CostLedger;
use crate::monitor::BudgetMonitor;
use crate::reconciler::{ReconcileJob, UsageReconciler};

/// Reconcile, persist, publish, then check budgets, for one job
pub struct CostPipeline {
    reconciler: UsageReconciler,
    ledger: CostLedger,
    sink: Arc<dyn EventSink>,
    monitor: Arc<BudgetMonitor>,
    recorded: Counter<u64>,
}

impl CostPipeline {
    pub fn new(
        reconciler: UsageReconciler,
        ledger: CostLedger,
        sink: Arc<dyn EventSink>,
        monitor: Arc<BudgetMonitor>,
    ) -> Self {
        Self {
            reconciler,
            ledger,
            sink,
            monitor,
            recorded: metrics::meter().u64_counter(metrics::COST_RECORDED).build(),
        }
    }

    /// Settle one job; failures are logged and never propagate
    pub async fn process(&self, job: ReconcileJob) {
        let event = self.reconciler.reconcile(&job).await;

        if let Err(e) = self.ledger.insert(event.clone()).await {
            tracing::error!(
                error = %e,
                correlation_id = %event.correlation_id,
                model = %event.model,
                "failed to persist cost event"
            );
            return;
        }

        self.recorded.add(
            1,
            &[
                KeyValue::new("model", event.model.clone()),
                KeyValue::new("accuracy", event.accuracy.as_str()),
            ],
        );

        self.sink.publish(GatewayEvent::CostRecorded(event.clone())).await;

        if let Err(e) = self.monitor.observe(&event).await {
            tracing::warn!(error = %e, "failed to evaluate budget thresholds");
        }
    }
}

impl std::fmt::Debug for CostPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostPipeline")
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}

/// Producer side of the reconciliation queue
///
/// Enqueueing never waits on accounting. A full queue defers the job to a
/// background send, up to as many deferred jobs as the queue holds; past
/// that the job is dropped.
#[derive(Clone)]
pub struct ReconcileQueue {
    tx: mpsc::Sender<ReconcileJob>,
    deferred: Arc<AtomicUsize>,
    overflow: usize,
    dropped: Counter<u64>,
}

/// Worker tasks draining the queue
#[derive(Debug)]
pub struct QueueWorkers {
    handles: Vec<JoinHandle<()>>,
}

impl ReconcileQueue {
    /// Queue whose jobs are consumed by the caller instead of a worker pool
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<ReconcileJob>) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let queue = Self {
            tx,
            deferred: Arc::new(AtomicUsize::new(0)),
            overflow: capacity,
            dropped: metrics::meter().u64_counter(metrics::COST_DROPPED).build(),
        };
        (queue, rx)
    }

    /// Spawn `workers` tasks consuming a queue of `capacity` jobs
    pub fn start(pipeline: Arc<CostPipeline>, capacity: usize, workers: usize) -> (Self, QueueWorkers) {
        let (queue, rx) = Self::bounded(capacity);
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..workers.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let pipeline = Arc::clone(&pipeline);
                tokio::spawn(run_worker(worker, rx, pipeline))
            })
            .collect();

        (queue, QueueWorkers { handles })
    }

    pub fn enqueue(&self, job: ReconcileJob) {
        match self.tx.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(job)) => self.defer(job),
            Err(mpsc::error::TrySendError::Closed(job)) => {
                tracing::warn!(
                    correlation_id = %job.context.correlation_id,
                    "reconciliation queue closed, dropping job"
                );
            }
        }
    }

    /// Jobs waiting on a background send for queue space
    pub fn deferred(&self) -> usize {
        self.deferred.load(Ordering::Acquire)
    }

    fn defer(&self, job: ReconcileJob) {
        let reserved = self
            .deferred
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < self.overflow).then_some(n + 1));

        if reserved.is_err() {
            tracing::error!(
                correlation_id = %job.context.correlation_id,
                model = %job.model,
                overflow = self.overflow,
                "reconciliation queue overflow full, dropping job"
            );
            self.dropped.add(1, &[KeyValue::new("model", job.model)]);
            return;
        }

        tracing::warn!(
            correlation_id = %job.context.correlation_id,
            "reconciliation queue full, deferring job"
        );
        let tx = self.tx.clone();
        let deferred = Arc::clone(&self.deferred);
        tokio::spawn(async move {
            if tx.send(job).await.is_err() {
                tracing::warn!("reconciliation queue closed, dropping deferred job");
            }
            deferred.fetch_sub(1, Ordering::AcqRel);
        });
    }
}

impl std::fmt::Debug for ReconcileQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileQueue")
            .field("available", &self.tx.capacity())
            .field("deferred", &self.deferred())
            .field("overflow", &self.overflow)
            .finish()
    }
}

impl QueueWorkers {
    /// Wait for the workers to finish every queued job
    ///
    /// Only returns once every `ReconcileQueue` handle has been dropped.
    pub async fn drain(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "reconciliation worker panicked");
            }
        }
        tracing::debug!("reconciliation queue drained");
    }
}

async fn run_worker(worker: usize, rx: Arc<Mutex<mpsc::Receiver<ReconcileJob>>>, pipeline: Arc<CostPipeline>) {
    loop {
        // hold the receiver only while waiting, not while processing
        let job = rx.lock().await.recv().await;
        let Some(job) = job else { break };
        pipeline.process(job).await;
    }
    tracing::debug!(worker, "reconciliation worker stopped");
}
