//! Ordered retry and fallback across a named model chain

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use jiff::Timestamp;
use tokio::time::Instant;
use tollgate_billing::{ReconcileJob, ReconcileQueue};
use tollgate_config::{ChainConfig, Config, HumanDuration, ModelRef};
use tollgate_core::{RequestContext, UsageReference};
use tollgate_provider::{InferenceRequest, InferenceResponse, Provider, ProviderErrorKind, ProviderRegistry};
use tollgate_ratelimit::{RateLimitError, RateLimiter};
use tollgate_telemetry::{Counter, KeyValue, metrics};

use crate::attempt::{self, AttemptOutcome, AttemptRecord, ModelAttempts};
use crate::error::{ChainError, ModelFailure, UnresolvedModel};

/// A successful chain run
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    pub response: InferenceResponse,
    /// Model that produced the response, as `provider/model`
    pub model_used: String,
    /// Attempts each model received, in chain order
    pub attempts: Vec<ModelAttempts>,
    /// Attempts beyond the first across the whole chain
    pub retry_count: u32,
}

struct ChainStep {
    label: String,
    model: String,
    provider: Arc<dyn Provider>,
    max_attempts: u32,
}

struct ChainPlan {
    config: ChainConfig,
    steps: Vec<ChainStep>,
}

/// State of one run, owned outside the deadline so it survives a timeout
#[derive(Default)]
struct ChainRun {
    records: Vec<AttemptRecord>,
    failures: Vec<ModelFailure>,
    reference: Option<UsageReference>,
    last_model: Option<String>,
}

/// Walks a model chain with bounded per-model retry and cross-model fallback
///
/// Attempts for one request are strictly sequential. Every attempt first
/// takes capacity from the shared rate limiter. Whatever the outcome, a
/// chain that reached a provider hands one job to the reconciliation queue
/// without waiting on it.
pub struct ModelChainExecutor {
    chains: IndexMap<String, ChainPlan>,
    limiter: Arc<RateLimiter>,
    queue: ReconcileQueue,
    default_deadline: Duration,
    default_output_units: u64,
    attempts_counter: Counter<u64>,
    fallbacks_counter: Counter<u64>,
}

impl ModelChainExecutor {
    pub fn new(
        config: &Config,
        providers: &ProviderRegistry,
        limiter: Arc<RateLimiter>,
        queue: ReconcileQueue,
    ) -> Result<Self, UnresolvedModel> {
        let mut chains = IndexMap::with_capacity(config.chains.len());

        for (name, chain) in &config.chains {
            let steps = chain
                .models
                .iter()
                .enumerate()
                .map(|(index, entry)| {
                    let resolved = ModelRef::parse(entry.model())
                        .and_then(|model_ref| providers.resolve(&model_ref).map(|provider| (model_ref, provider)));
                    let Some((model_ref, provider)) = resolved else {
                        return Err(UnresolvedModel {
                            chain: name.clone(),
                            model: entry.model().to_owned(),
                        });
                    };

                    Ok(ChainStep {
                        label: model_ref.to_string(),
                        model: model_ref.model,
                        provider,
                        max_attempts: chain.attempts_for(index).max(1),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            chains.insert(
                name.clone(),
                ChainPlan {
                    config: chain.clone(),
                    steps,
                },
            );
        }

        let meter = metrics::meter();

        Ok(Self {
            chains,
            limiter,
            queue,
            default_deadline: config.server.default_deadline.get(),
            default_output_units: config.rate_limit.default_output_units,
            attempts_counter: meter.u64_counter(metrics::CHAIN_ATTEMPTS).build(),
            fallbacks_counter: meter.u64_counter(metrics::CHAIN_FALLBACKS).build(),
        })
    }

    /// Names of the configured chains
    pub fn chains(&self) -> impl Iterator<Item = &str> {
        self.chains.keys().map(String::as_str)
    }

    /// Run `request` against the named chain
    ///
    /// `deadline` bounds the whole walk, falling back to the chain's own
    /// deadline and then the server default. On expiry the in-flight attempt
    /// is dropped and [`ChainError::Timeout`] is returned.
    #[tracing::instrument(
        name = "chain.execute",
        skip_all,
        fields(chain = %chain, correlation_id = %context.correlation_id)
    )]
    pub async fn execute(
        &self,
        chain: &str,
        mut request: InferenceRequest,
        context: RequestContext,
        deadline: Option<Duration>,
    ) -> Result<ChainOutcome, ChainError> {
        let plan = self
            .chains
            .get(chain)
            .ok_or_else(|| ChainError::UnknownChain(chain.to_owned()))?;

        request.strip_reserved();

        let started = Instant::now();
        let budget = deadline
            .or_else(|| plan.config.deadline.map(HumanDuration::get))
            .unwrap_or(self.default_deadline);
        let deadline_at = started + budget;

        let mut run = ChainRun::default();
        let walked = tokio::time::timeout_at(deadline_at, self.walk(chain, plan, &request, deadline_at, &mut run)).await;

        let result = walked.unwrap_or_else(|_| {
            let elapsed = started.elapsed();
            tracing::warn!(?elapsed, model = ?run.last_model, "chain deadline exceeded");
            Err(ChainError::Timeout {
                elapsed,
                failures: std::mem::take(&mut run.failures),
            })
        });

        self.settle(run, context, &result);
        result
    }

    async fn walk(
        &self,
        chain: &str,
        plan: &ChainPlan,
        request: &InferenceRequest,
        deadline_at: Instant,
        run: &mut ChainRun,
    ) -> Result<ChainOutcome, ChainError> {
        let volume = request.estimated_volume(self.default_output_units);

        for (index, step) in plan.steps.iter().enumerate() {
            if index > 0 {
                self.fallbacks_counter
                    .add(1, &[KeyValue::new("chain", chain.to_owned())]);
                tracing::info!(model = %step.label, "falling back to next model in chain");
            }

            let mut last_error = None;
            let mut attempts = 0;

            for attempt in 1..=step.max_attempts {
                self.admit(&step.label, volume).await?;
                attempts = attempt;

                let timeout = step
                    .provider
                    .timeout()
                    .min(deadline_at.saturating_duration_since(Instant::now()));
                run.last_model = Some(step.label.clone());

                let dispatched = Instant::now();
                let result = step.provider.invoke(&step.model, request, timeout).await;
                let latency = dispatched.elapsed();

                let outcome = match &result {
                    Ok(_) => AttemptOutcome::Success,
                    Err(e) => AttemptOutcome::Failed(e.kind),
                };
                self.attempts_counter.add(
                    1,
                    &[
                        KeyValue::new("model", step.label.clone()),
                        KeyValue::new("outcome", outcome.as_str()),
                    ],
                );
                run.records.push(AttemptRecord {
                    model: step.label.clone(),
                    attempt,
                    outcome,
                    latency,
                });

                let error = match result {
                    Ok(invocation) => {
                        run.reference = invocation.reference;
                        tracing::debug!(model = %step.label, attempt, ?latency, "attempt succeeded");
                        return Ok(ChainOutcome {
                            response: invocation.response,
                            model_used: step.label.clone(),
                            attempts: attempt::summarize(&run.records),
                            retry_count: attempt::retry_count(&run.records),
                        });
                    }
                    Err(error) => error,
                };

                if error.reference.is_some() {
                    run.reference.clone_from(&error.reference);
                }
                tracing::warn!(
                    model = %step.label,
                    attempt,
                    kind = error.kind.as_str(),
                    error = %error.message,
                    "attempt failed"
                );

                match error.kind {
                    ProviderErrorKind::Permanent => {
                        return Err(ChainError::PermanentRequest {
                            model: step.label.clone(),
                            message: error.message,
                        });
                    }
                    ProviderErrorKind::ModelUnavailable => {
                        last_error = Some(error);
                        break;
                    }
                    ProviderErrorKind::Transient => {
                        last_error = Some(error);
                        if attempt < step.max_attempts {
                            let retry = usize::try_from(attempt - 1).unwrap_or(usize::MAX);
                            tokio::time::sleep(plan.config.backoff_for(retry)).await;
                        }
                    }
                }
            }

            if let Some(error) = last_error {
                run.failures
                    .push(ModelFailure::new(&step.label, attempts, error.kind, error.message));
            }
        }

        Err(ChainError::AllModelsUnavailable {
            failures: std::mem::take(&mut run.failures),
        })
    }

    async fn admit(&self, model: &str, volume: u64) -> Result<(), ChainError> {
        match self.limiter.acquire(volume).await {
            Ok(permit) => {
                if !permit.waited.is_zero() {
                    tracing::debug!(model, waited = ?permit.waited, "rate limit capacity granted after wait");
                }
                Ok(())
            }
            Err(RateLimitError::Exceeded { retry_after }) => Err(ChainError::RateLimited { retry_after }),
            Err(e) => Err(ChainError::PermanentRequest {
                model: model.to_owned(),
                message: e.to_string(),
            }),
        }
    }

    /// Hand the finished chain to cost accounting
    fn settle(&self, run: ChainRun, context: RequestContext, result: &Result<ChainOutcome, ChainError>) {
        // rejected before any provider saw it
        let Some(model) = run.last_model else {
            return;
        };

        tracing::debug!(
            success = result.is_ok(),
            attempts = %attempt::trail(&run.records),
            "chain finished"
        );

        let (success, estimate) = match result {
            Ok(outcome) => (true, outcome.response.inline_usage.clone()),
            Err(_) => (false, None),
        };

        self.queue.enqueue(ReconcileJob {
            context,
            model,
            reference: run.reference,
            estimate,
            success,
            retry_count: attempt::retry_count(&run.records),
            completed_at: Timestamp::now(),
        });
    }
}

impl std::fmt::Debug for ModelChainExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelChainExecutor")
            .field("chains", &self.chains.keys().collect::<Vec<_>>())
            .field("default_deadline", &self.default_deadline)
            .finish_non_exhaustive()
    }
}
