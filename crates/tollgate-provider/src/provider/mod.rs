//! Provider trait and the upstream implementations

pub mod openai;
pub mod openrouter;

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use tollgate_core::{UsageEstimate, UsageReference};
use url::Url;

use crate::error::ProviderError;
use crate::types::{InferenceRequest, InferenceResponse, Invocation, ModelList, UsageLookup, WireRequest, WireResponse};

/// Client for one upstream provider
#[async_trait]
pub trait Provider: Send + Sync {
    /// Configured provider name, the prefix in `provider/model`
    fn name(&self) -> &str;

    /// Upper bound for a single call, before the caller's deadline applies
    fn timeout(&self) -> Duration;

    /// Send one completion request to `model`
    async fn invoke(
        &self,
        model: &str,
        request: &InferenceRequest,
        timeout: Duration,
    ) -> Result<Invocation, ProviderError>;

    /// Look up authoritative usage for an earlier call
    async fn fetch_usage(&self, reference: &UsageReference) -> Result<UsageLookup, ProviderError>;

    /// Model ids the upstream currently offers
    async fn list_available_models(&self) -> Result<HashSet<String>, ProviderError>;
}

/// HTTP plumbing shared by the OpenAI-style upstreams
pub(crate) struct HttpUpstream {
    pub name: String,
    pub client: Client,
    pub base_url: Url,
    pub api_key: Option<SecretString>,
}

impl HttpUpstream {
    /// `timeout` bounds every call; completions override it per request
    pub fn new(
        name: String,
        base_url: Url,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::permanent(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            name,
            client,
            base_url,
            api_key,
        })
    }

    pub fn url(&self, path: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/{path}")
    }

    pub fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }

    /// POST a chat completion and split out the reference and inline usage
    pub async fn chat_completion(
        &self,
        model: &str,
        request: &InferenceRequest,
        timeout: Duration,
    ) -> Result<(InferenceResponse, Option<String>), ProviderError> {
        let wire_request = WireRequest { model, request };

        let response = self
            .authorized(self.client.post(self.url("chat/completions")))
            .timeout(timeout)
            .json(&wire_request)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(provider = %self.name, model, error = %e, "upstream request failed");
                ProviderError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = ProviderError::from_status(status, &body);
            tracing::warn!(
                provider = %self.name,
                model,
                status = %status,
                kind = error.kind.as_str(),
                "upstream returned error"
            );
            return Err(error);
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::transient(format!("failed to parse response: {e}")))?;

        let wire: WireResponse = serde_json::from_value(body.clone())
            .map_err(|e| ProviderError::transient(format!("unexpected response shape: {e}")))?;

        let response = InferenceResponse {
            model: wire.model.unwrap_or_else(|| model.to_owned()),
            inline_usage: wire.usage.as_ref().map(UsageEstimate::from),
            body,
        };

        Ok((response, wire.id))
    }

    pub async fn list_models(&self) -> Result<HashSet<String>, ProviderError> {
        let response = self
            .authorized(self.client.get(self.url("models")))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }

        let list: ModelList = response
            .json()
            .await
            .map_err(|e| ProviderError::transient(format!("failed to parse model list: {e}")))?;

        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}

pub(crate) fn parse_base_url(configured: Option<&Url>, default: &str) -> Result<Url, ProviderError> {
    match configured {
        Some(url) => Ok(url.clone()),
        None => Url::parse(default).map_err(|e| ProviderError::permanent(format!("invalid default base URL: {e}"))),
    }
}

impl Invocation {
    pub(crate) fn new(response: InferenceResponse, provider: &str, id: Option<String>) -> Self {
        Self {
            response,
            reference: id.map(|id| UsageReference::new(provider, id)),
        }
    }
}
