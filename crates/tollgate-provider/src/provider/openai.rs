//! OpenAI-compatible provider
//!
//! These upstreams have no separate billing lookup. The usage they report
//! with each response is on their billing basis, so it is priced from the
//! configured table when the response arrives and parked until the
//! reconciler asks for it.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tollgate_config::{ModelPricing, ProviderConfig};
use tollgate_core::{UsageRecord, UsageReference};

use super::{HttpUpstream, Provider, parse_base_url};
use crate::error::ProviderError;
use crate::types::{InferenceRequest, Invocation, UsageLookup};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Parked usage nobody asked for within this long is discarded
const SETTLED_TTL: Duration = Duration::from_secs(15 * 60);

pub struct OpenAiProvider {
    upstream: HttpUpstream,
    timeout: Duration,
    pricing: HashMap<String, ModelPricing>,
    settled: DashMap<String, (UsageRecord, Instant)>,
}

impl OpenAiProvider {
    pub fn new(name: String, config: &ProviderConfig) -> Result<Self, ProviderError> {
        let base_url = parse_base_url(config.base_url.as_ref(), DEFAULT_BASE_URL)?;

        Ok(Self {
            upstream: HttpUpstream::new(name, base_url, config.api_key.clone(), config.timeout.get())?,
            timeout: config.timeout.get(),
            pricing: config.pricing.clone(),
            settled: DashMap::new(),
        })
    }

    /// Price reported usage; the served model id may carry a dated suffix
    fn price(&self, requested: &str, served: &str) -> Option<&ModelPricing> {
        self.pricing.get(served).or_else(|| self.pricing.get(requested))
    }

    /// Hold usage for the reconciler, dropping entries whose job never came
    fn park(&self, id: String, record: UsageRecord) {
        let before = self.settled.len();
        self.settled.retain(|_, (_, parked_at)| parked_at.elapsed() < SETTLED_TTL);

        let evicted = before - self.settled.len();
        if evicted > 0 {
            tracing::debug!(provider = %self.name(), evicted, "discarded unclaimed usage");
        }

        self.settled.insert(id, (record, Instant::now()));
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.upstream.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn invoke(
        &self,
        model: &str,
        request: &InferenceRequest,
        timeout: Duration,
    ) -> Result<Invocation, ProviderError> {
        let (response, id) = self.upstream.chat_completion(model, request, timeout).await?;

        if let (Some(id), Some(usage)) = (&id, &response.inline_usage) {
            match self.price(model, &response.model) {
                Some(pricing) => {
                    let record = UsageRecord {
                        input_units: usage.input_units,
                        output_units: usage.output_units,
                        cost: pricing.cost(usage.input_units, usage.output_units),
                    };
                    self.park(id.clone(), record);
                }
                None => tracing::warn!(
                    provider = %self.name(),
                    model,
                    "no pricing configured; usage will be recorded as degraded"
                ),
            }
        }

        Ok(Invocation::new(response, self.name(), id))
    }

    async fn fetch_usage(&self, reference: &UsageReference) -> Result<UsageLookup, ProviderError> {
        Ok(self
            .settled
            .remove(&reference.id)
            .map_or(UsageLookup::NotYetAvailable, |(_, (record, _))| UsageLookup::Ready(record)))
    }

    async fn list_available_models(&self) -> Result<HashSet<String>, ProviderError> {
        self.upstream.list_models().await
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use secrecy::SecretString;
    use serde_json::json;
    use tollgate_config::{HumanDuration, ProviderType};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::ChatMessage;

    fn provider(server: &MockServer) -> OpenAiProvider {
        let mut pricing = HashMap::new();
        pricing.insert(
            "gpt-4o-mini".to_owned(),
            ModelPricing {
                input_per_million: dec!(0.15),
                output_per_million: dec!(0.60),
            },
        );

        let config = ProviderConfig {
            provider_type: ProviderType::Openai,
            api_key: Some(SecretString::from("sk-test".to_owned())),
            base_url: Some(server.uri().parse().unwrap()),
            timeout: HumanDuration::from_secs(5),
            pricing,
        };
        OpenAiProvider::new("openai".to_owned(), &config).unwrap()
    }

    fn request() -> InferenceRequest {
        InferenceRequest::new(vec![ChatMessage {
            role: "user".to_owned(),
            content: "hello".to_owned(),
        }])
    }

    async fn mount_completion(server: &MockServer, served_model: &str) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-1",
                "model": served_model,
                "choices": [],
                "usage": {"prompt_tokens": 1000, "completion_tokens": 2000}
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn priced_usage_is_available_once() {
        let server = MockServer::start().await;
        mount_completion(&server, "gpt-4o-mini-2024-07-18").await;

        let provider = provider(&server);
        let invocation = provider
            .invoke("gpt-4o-mini", &request(), Duration::from_secs(5))
            .await
            .unwrap();
        let reference = invocation.reference.unwrap();

        let lookup = provider.fetch_usage(&reference).await.unwrap();
        assert_eq!(
            lookup,
            UsageLookup::Ready(UsageRecord {
                input_units: 1000,
                output_units: 2000,
                cost: dec!(0.00135),
            })
        );

        // consumed by the first lookup
        assert_eq!(provider.fetch_usage(&reference).await.unwrap(), UsageLookup::NotYetAvailable);
    }

    #[tokio::test]
    async fn unpriced_model_never_settles() {
        let server = MockServer::start().await;
        mount_completion(&server, "o1-preview").await;

        let provider = provider(&server);
        let invocation = provider
            .invoke("o1-preview", &request(), Duration::from_secs(5))
            .await
            .unwrap();

        let lookup = provider.fetch_usage(&invocation.reference.unwrap()).await.unwrap();
        assert_eq!(lookup, UsageLookup::NotYetAvailable);
    }

    #[tokio::test]
    async fn unclaimed_usage_expires() {
        let server = MockServer::start().await;
        mount_completion(&server, "gpt-4o-mini").await;

        let provider = provider(&server);
        let record = UsageRecord {
            input_units: 1,
            output_units: 1,
            cost: dec!(0.01),
        };
        let stale = Instant::now().checked_sub(SETTLED_TTL + Duration::from_secs(1)).unwrap();
        provider.settled.insert("chatcmpl-abandoned".to_owned(), (record, stale));

        let invocation = provider
            .invoke("gpt-4o-mini", &request(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(provider.settled.len(), 1);
        let abandoned = UsageReference::new("openai", "chatcmpl-abandoned");
        assert_eq!(provider.fetch_usage(&abandoned).await.unwrap(), UsageLookup::NotYetAvailable);
        assert!(matches!(
            provider.fetch_usage(&invocation.reference.unwrap()).await.unwrap(),
            UsageLookup::Ready(_)
        ));
    }

    #[tokio::test]
    async fn unknown_reference_is_not_yet_available() {
        let server = MockServer::start().await;
        let lookup = provider(&server)
            .fetch_usage(&UsageReference::new("openai", "chatcmpl-unknown"))
            .await
            .unwrap();
        assert_eq!(lookup, UsageLookup::NotYetAvailable);
    }
}
