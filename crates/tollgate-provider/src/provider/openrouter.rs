//! OpenRouter provider
//!
//! Inline usage in a completion is normalized across models and does not
//! match what OpenRouter bills. The billed figures come from the generation
//! endpoint, which only knows about a generation some time after it finished.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use tollgate_config::ProviderConfig;
use tollgate_core::{UsageRecord, UsageReference};

use super::{HttpUpstream, Provider, parse_base_url};
use crate::error::ProviderError;
use crate::types::{InferenceRequest, Invocation, UsageLookup};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

pub struct OpenRouterProvider {
    upstream: HttpUpstream,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct GenerationEnvelope {
    data: Generation,
}

#[derive(Debug, Deserialize)]
struct Generation {
    #[serde(default)]
    native_tokens_prompt: Option<u64>,
    #[serde(default)]
    native_tokens_completion: Option<u64>,
    #[serde(default)]
    tokens_prompt: Option<u64>,
    #[serde(default)]
    tokens_completion: Option<u64>,
    #[serde(default)]
    total_cost: Option<Decimal>,
}

impl OpenRouterProvider {
    pub fn new(name: String, config: &ProviderConfig) -> Result<Self, ProviderError> {
        let base_url = parse_base_url(config.base_url.as_ref(), DEFAULT_BASE_URL)?;

        Ok(Self {
            upstream: HttpUpstream::new(name, base_url, config.api_key.clone(), config.timeout.get())?,
            timeout: config.timeout.get(),
        })
    }
}

#[async_trait]
impl Provider for OpenRouterProvider {
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
        Ok(Invocation::new(response, self.name(), id))
    }

    async fn fetch_usage(&self, reference: &UsageReference) -> Result<UsageLookup, ProviderError> {
        let response = self
            .upstream
            .authorized(self.upstream.client.get(self.upstream.url("generation")))
            .query(&[("id", reference.id.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(provider = %self.name(), id = %reference.id, "generation not yet available");
            return Ok(UsageLookup::NotYetAvailable);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }

        let envelope: GenerationEnvelope = response
            .json()
            .await
            .map_err(|e| ProviderError::transient(format!("failed to parse generation: {e}")))?;
        let generation = envelope.data;

        // the record exists before its cost is settled
        let Some(cost) = generation.total_cost else {
            return Ok(UsageLookup::NotYetAvailable);
        };

        Ok(UsageLookup::Ready(UsageRecord {
            input_units: generation
                .native_tokens_prompt
                .or(generation.tokens_prompt)
                .unwrap_or_default(),
            output_units: generation
                .native_tokens_completion
                .or(generation.tokens_completion)
                .unwrap_or_default(),
            cost,
        }))
    }

    async fn list_available_models(&self) -> Result<HashSet<String>, ProviderError> {
        self.upstream.list_models().await
    }
}
