use std::fmt;
use std::time::Duration;

use jiff::Timestamp;
use tollgate_core::{CostEvent, RequestContext, UsageEstimate, UsageRecord, UsageReference};
use tollgate_provider::{ProviderErrorKind, ProviderRegistry, UsageLookup};
use tollgate_telemetry::{Counter, KeyValue, metrics};

/// Everything needed to settle the cost of one finished chain
#[derive(Debug, Clone)]
pub struct ReconcileJob {
    pub context: RequestContext,
    /// Model that produced the final outcome, as `provider/model`
    pub model: String,
    /// Reference from the last attempt that reached the provider
    pub reference: Option<UsageReference>,
    /// Inline usage reported with the response, if any
    pub estimate: Option<UsageEstimate>,
    pub success: bool,
    pub retry_count: u32,
    /// When the chain finished; becomes the event timestamp
    pub completed_at: Timestamp,
}

/// Why the authoritative lookup could not be used
#[derive(Debug)]
enum UsageLookupDegraded {
    UnknownProvider,
    NotYetAvailable { lookups: usize },
    LookupFailed { kind: ProviderErrorKind, message: String },
}

impl UsageLookupDegraded {
    const fn reason(&self) -> &'static str {
        match self {
            Self::UnknownProvider => "unknown_provider",
            Self::NotYetAvailable { .. } => "not_yet_available",
            Self::LookupFailed { .. } => "lookup_failed",
        }
    }
}

impl fmt::Display for UsageLookupDegraded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownProvider => f.write_str("reference names an unregistered provider"),
            Self::NotYetAvailable { lookups } => write!(f, "usage still unavailable after {lookups} lookups"),
            Self::LookupFailed { kind, message } => write!(f, "{} lookup failure: {message}", kind.as_str()),
        }
    }
}

/// Resolves authoritative usage for a finished chain into one `CostEvent`
///
/// Reconciliation is total: whatever the provider answers, a single event
/// comes out, flagged `degraded` when it had to fall back to the estimate.
#[derive(Clone)]
pub struct UsageReconciler {
    providers: ProviderRegistry,
    backoff: Vec<Duration>,
    degraded_counter: Counter<u64>,
}

impl UsageReconciler {
    /// `backoff` holds the delays between lookups; the first lookup is immediate
    pub fn new(providers: ProviderRegistry, backoff: Vec<Duration>) -> Self {
        Self {
            providers,
            backoff,
            degraded_counter: metrics::meter().u64_counter(metrics::COST_DEGRADED).build(),
        }
    }

    pub async fn reconcile(&self, job: &ReconcileJob) -> CostEvent {
        let Some(reference) = &job.reference else {
            return if job.success {
                self.degraded(job, "no_reference")
            } else {
                // never reached a billable call
                CostEvent::unbilled(job.completed_at, &job.context, &job.model, false, job.retry_count)
            };
        };

        match self.lookup(reference).await {
            Ok(usage) => {
                tracing::debug!(
                    correlation_id = %job.context.correlation_id,
                    model = %job.model,
                    cost = %usage.cost,
                    "usage reconciled"
                );
                CostEvent::from_usage(
                    job.completed_at,
                    &job.context,
                    &job.model,
                    &usage,
                    job.success,
                    job.retry_count,
                )
            }
            Err(degraded) => {
                tracing::warn!(
                    correlation_id = %job.context.correlation_id,
                    provider = %reference.provider,
                    reference = %reference.id,
                    error = %degraded,
                    "usage lookup degraded, recording estimate"
                );
                self.degraded(job, degraded.reason())
            }
        }
    }

    async fn lookup(&self, reference: &UsageReference) -> Result<UsageRecord, UsageLookupDegraded> {
        let provider = self
            .providers
            .get(&reference.provider)
            .ok_or(UsageLookupDegraded::UnknownProvider)?;

        let mut delays = self.backoff.iter();
        let mut lookups = 0;

        loop {
            lookups += 1;
            match provider.fetch_usage(reference).await {
                Ok(UsageLookup::Ready(usage)) => return Ok(usage),
                Ok(UsageLookup::NotYetAvailable) => {
                    tracing::trace!(reference = %reference.id, lookups, "usage not yet available");
                }
                Err(e) if e.kind == ProviderErrorKind::Transient => {
                    tracing::debug!(reference = %reference.id, error = %e, "usage lookup failed, will retry");
                }
                Err(e) => {
                    return Err(UsageLookupDegraded::LookupFailed {
                        kind: e.kind,
                        message: e.message,
                    });
                }
            }

            let Some(delay) = delays.next() else {
                return Err(UsageLookupDegraded::NotYetAvailable { lookups });
            };
            tokio::time::sleep(*delay).await;
        }
    }

    fn degraded(&self, job: &ReconcileJob, reason: &'static str) -> CostEvent {
        self.degraded_counter.add(1, &[KeyValue::new("reason", reason)]);
        let estimate = job.estimate.clone().unwrap_or_default();
        CostEvent::from_estimate(
            job.completed_at,
            &job.context,
            &job.model,
            &estimate,
            job.success,
            job.retry_count,
        )
    }
}

impl fmt::Debug for UsageReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsageReconciler")
            .field("providers", &self.providers)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashSet, VecDeque};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use tollgate_core::Accuracy;
    use tollgate_provider::{InferenceRequest, Invocation, Provider, ProviderError};

    use super::*;

    /// Answers usage lookups from a script, repeating the last answer
    struct ScriptedUsage {
        answers: Mutex<VecDeque<Result<UsageLookup, ProviderError>>>,
        lookups: Mutex<Vec<tokio::time::Instant>>,
    }

    impl ScriptedUsage {
        fn new(answers: Vec<Result<UsageLookup, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.into()),
                lookups: Mutex::new(Vec::new()),
            })
        }

        fn lookups(&self) -> Vec<tokio::time::Instant> {
            self.lookups.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedUsage {
        fn name(&self) -> &str {
            "openrouter"
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }

        async fn invoke(&self, _: &str, _: &InferenceRequest, _: Duration) -> Result<Invocation, ProviderError> {
            Err(ProviderError::permanent("not used"))
        }

        async fn fetch_usage(&self, _: &UsageReference) -> Result<UsageLookup, ProviderError> {
            self.lookups.lock().unwrap().push(tokio::time::Instant::now());
            let mut answers = self.answers.lock().unwrap();
            if answers.len() > 1 {
                answers.pop_front().unwrap()
            } else {
                match answers.front().unwrap() {
                    Ok(lookup) => Ok(lookup.clone()),
                    Err(e) => Err(ProviderError::new(e.kind, e.message.clone())),
                }
            }
        }

        async fn list_available_models(&self) -> Result<HashSet<String>, ProviderError> {
            Ok(HashSet::new())
        }
    }

    fn reconciler(provider: Arc<ScriptedUsage>) -> UsageReconciler {
        let mut registry = ProviderRegistry::default();
        registry.insert(provider);
        UsageReconciler::new(
            registry,
            vec![Duration::from_millis(250), Duration::from_millis(500), Duration::from_secs(1)],
        )
    }

    fn job(reference: Option<UsageReference>, success: bool) -> ReconcileJob {
        ReconcileJob {
            context: RequestContext::new("chat", "svc-1"),
            model: "openrouter/openai/gpt-4o".to_owned(),
            reference,
            estimate: Some(UsageEstimate {
                input_units: 90,
                output_units: 40,
                cost: Some(dec!(0.0009)),
            }),
            success,
            retry_count: 2,
            completed_at: "2025-06-10T12:00:00Z".parse().unwrap(),
        }
    }

    fn reference() -> Option<UsageReference> {
        Some(UsageReference::new("openrouter", "gen-123"))
    }

    fn billed() -> UsageRecord {
        UsageRecord {
            input_units: 100,
            output_units: 42,
            cost: dec!(0.00123),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_on_third_lookup_with_full_accuracy() {
        let provider = ScriptedUsage::new(vec![
            Ok(UsageLookup::NotYetAvailable),
            Ok(UsageLookup::NotYetAvailable),
            Ok(UsageLookup::Ready(billed())),
        ]);
        let reconciler = reconciler(provider.clone());
        let job = job(reference(), true);

        let event = reconciler.reconcile(&job).await;

        assert_eq!(event.accuracy, Accuracy::Full);
        assert_eq!(event.cost, dec!(0.00123));
        assert_eq!(event.input_units, 100);
        assert_eq!(event.output_units, 42);
        assert_eq!(event.retry_count, 2);
        assert_eq!(event.timestamp, job.completed_at);
        assert_eq!(event.correlation_id, job.context.correlation_id);

        let lookups = provider.lookups();
        assert_eq!(lookups.len(), 3);
        assert_eq!(lookups[1] - lookups[0], Duration::from_millis(250));
        assert_eq!(lookups[2] - lookups[1], Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_lookups_fall_back_to_estimate() {
        let provider = ScriptedUsage::new(vec![Ok(UsageLookup::NotYetAvailable)]);
        let reconciler = reconciler(provider.clone());

        let event = reconciler.reconcile(&job(reference(), true)).await;

        assert_eq!(event.accuracy, Accuracy::Degraded);
        assert_eq!(event.cost, dec!(0.0009));
        assert_eq!(event.input_units, 90);
        // immediate lookup plus one per backoff delay
        assert_eq!(provider.lookups().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_lookup_errors_are_retried() {
        let provider = ScriptedUsage::new(vec![
            Err(ProviderError::transient("502 from upstream")),
            Ok(UsageLookup::Ready(billed())),
        ]);

        let event = reconciler(provider.clone()).reconcile(&job(reference(), true)).await;
        assert_eq!(event.accuracy, Accuracy::Full);
        assert_eq!(provider.lookups().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_lookup_error_degrades_immediately() {
        let provider = ScriptedUsage::new(vec![Err(ProviderError::permanent("401 unauthorized"))]);

        let event = reconciler(provider.clone()).reconcile(&job(reference(), true)).await;
        assert_eq!(event.accuracy, Accuracy::Degraded);
        assert_eq!(provider.lookups().len(), 1);
    }

    #[tokio::test]
    async fn failure_without_reference_is_unbilled() {
        let provider = ScriptedUsage::new(vec![Ok(UsageLookup::Ready(billed()))]);

        let event = reconciler(provider.clone()).reconcile(&job(None, false)).await;
        assert_eq!(event.accuracy, Accuracy::Full);
        assert_eq!(event.cost, dec!(0));
        assert!(!event.success);
        assert!(provider.lookups().is_empty());
    }

    #[tokio::test]
    async fn success_without_reference_is_degraded_estimate() {
        let provider = ScriptedUsage::new(vec![Ok(UsageLookup::Ready(billed()))]);

        let event = reconciler(provider).reconcile(&job(None, true)).await;
        assert_eq!(event.accuracy, Accuracy::Degraded);
        assert_eq!(event.output_units, 40);
    }

    #[tokio::test]
    async fn failed_chain_with_reference_is_still_billed() {
        let provider = ScriptedUsage::new(vec![Ok(UsageLookup::Ready(billed()))]);

        let event = reconciler(provider).reconcile(&job(reference(), false)).await;
        assert_eq!(event.accuracy, Accuracy::Full);
        assert_eq!(event.cost, dec!(0.00123));
        assert!(!event.success);
    }

    #[tokio::test]
    async fn unknown_provider_reference_degrades() {
        let provider = ScriptedUsage::new(vec![Ok(UsageLookup::Ready(billed()))]);
        let mut job = job(Some(UsageReference::new("bedrock", "abc")), true);
        job.estimate = None;

        let event = reconciler(provider).reconcile(&job).await;
        assert_eq!(event.accuracy, Accuracy::Degraded);
        assert_eq!(event.cost, dec!(0));
    }
}
