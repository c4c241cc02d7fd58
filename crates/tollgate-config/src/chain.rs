use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::HumanDuration;

/// An ordered fallback chain of models
///
/// Models are tried in the listed order. Each entry gets its own attempt
/// budget; transient failures back off using `backoff`, where the last
/// delay is reused once the list runs out.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
    /// Models in priority order, written as `provider/model`
    pub models: Vec<ChainEntry>,
    /// Default attempt budget per model
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delays between transient retries on the same model
    #[serde(default = "default_backoff")]
    pub backoff: Vec<HumanDuration>,
    /// Chain-specific deadline overriding `server.default_deadline`
    #[serde(default)]
    pub deadline: Option<HumanDuration>,
}

impl ChainConfig {
    /// Delay before retry number `retry` (zero-based) on the same model
    pub fn backoff_for(&self, retry: usize) -> Duration {
        self.backoff
            .get(retry)
            .or_else(|| self.backoff.last())
            .map_or(Duration::ZERO, |d| d.get())
    }

    /// Attempt budget for the entry at `index`
    pub fn attempts_for(&self, index: usize) -> u32 {
        self.models
            .get(index)
            .and_then(ChainEntry::max_attempts)
            .unwrap_or(self.max_attempts)
    }
}

/// A chain entry, either a bare model reference or a table with overrides
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChainEntry {
    Model(String),
    Detailed {
        model: String,
        #[serde(default)]
        max_attempts: Option<u32>,
    },
}

impl ChainEntry {
    pub fn model(&self) -> &str {
        match self {
            Self::Model(model) | Self::Detailed { model, .. } => model,
        }
    }

    pub const fn max_attempts(&self) -> Option<u32> {
        match self {
            Self::Model(_) => None,
            Self::Detailed { max_attempts, .. } => *max_attempts,
        }
    }
}

/// A model reference split into provider and provider-local model id
///
/// `openrouter/anthropic/claude-3.5-sonnet` splits at the first slash, so
/// model ids that contain slashes of their own survive intact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelRef {
    pub provider: String,
    pub model: String,
}

impl ModelRef {
    pub fn parse(reference: &str) -> Option<Self> {
        let (provider, model) = reference.split_once('/')?;
        if provider.is_empty() || model.is_empty() {
            return None;
        }
        Some(Self {
            provider: provider.to_owned(),
            model: model.to_owned(),
        })
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

const fn default_max_attempts() -> u32 {
    3
}

fn default_backoff() -> Vec<HumanDuration> {
    vec![
        HumanDuration::from_millis(200),
        HumanDuration::from_millis(500),
        HumanDuration::from_secs(1),
    ]
}
