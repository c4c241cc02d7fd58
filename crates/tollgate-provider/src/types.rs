//! Request and response shapes shared by every provider

use serde::{Deserialize, Serialize};
use tollgate_core::{UsageEstimate, UsageRecord, UsageReference};

/// A single chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// A chat completion request, independent of the model it is sent to
///
/// Fields the gateway does not interpret are passed through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl InferenceRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            max_tokens: None,
            temperature: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Drop pass-through fields the gateway decides for itself
    ///
    /// The model comes from the chain and streaming is not supported.
    pub fn strip_reserved(&mut self) {
        self.extra.remove("model");
        self.extra.remove("stream");
    }

    /// Rough input size, about four characters per unit
    pub fn estimated_input_units(&self) -> u64 {
        let chars: usize = self.messages.iter().map(|m| m.content.chars().count()).sum();
        (chars as u64).div_ceil(4)
    }

    /// Conservative pre-call volume: estimated input plus the output bound
    pub fn estimated_volume(&self, default_output_units: u64) -> u64 {
        let output = self.max_tokens.map_or(default_output_units, u64::from);
        self.estimated_input_units() + output
    }
}

/// Upstream wire request: the caller's request with the model filled in
#[derive(Serialize)]
pub(crate) struct WireRequest<'a> {
    pub model: &'a str,
    #[serde(flatten)]
    pub request: &'a InferenceRequest,
}

/// A completed upstream response
#[derive(Debug, Clone)]
pub struct InferenceResponse {
    /// Model the upstream reports having served
    pub model: String,
    /// Raw upstream body, returned to the caller as-is
    pub body: serde_json::Value,
    /// Usage reported inline; an estimate only, never billed directly
    pub inline_usage: Option<UsageEstimate>,
}

/// Successful invocation: the response plus the handle for usage lookup
#[derive(Debug, Clone)]
pub struct Invocation {
    pub response: InferenceResponse,
    pub reference: Option<UsageReference>,
}

/// Result of an authoritative usage lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageLookup {
    Ready(UsageRecord),
    /// The upstream has not finished accounting for the call yet
    NotYetAvailable,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub cost: Option<rust_decimal::Decimal>,
}

impl From<&WireUsage> for UsageEstimate {
    fn from(usage: &WireUsage) -> Self {
        Self {
            input_units: usage.prompt_tokens,
            output_units: usage.completion_tokens,
            cost: usage.cost,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModelList {
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModelEntry {
    pub id: String,
}
