use std::sync::Arc;

use indexmap::IndexMap;
use tollgate_config::{ModelRef, ProviderConfig, ProviderType};

use crate::error::ProviderError;
use crate::provider::Provider;
use crate::provider::openai::OpenAiProvider;
use crate::provider::openrouter::OpenRouterProvider;

/// Configured providers by name
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: IndexMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn from_config(configs: &IndexMap<String, ProviderConfig>) -> Result<Self, ProviderError> {
        let mut registry = Self::default();

        for (name, config) in configs {
            let provider: Arc<dyn Provider> = match config.provider_type {
                ProviderType::Openrouter => Arc::new(OpenRouterProvider::new(name.clone(), config)?),
                ProviderType::Openai => Arc::new(OpenAiProvider::new(name.clone(), config)?),
            };
            tracing::debug!(provider = %name, kind = ?config.provider_type, "provider registered");
            registry.insert(provider);
        }

        Ok(registry)
    }

    /// Register a provider under its own name, replacing any previous one
    pub fn insert(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.name().to_owned(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Provider serving a `provider/model` reference
    pub fn resolve(&self, model: &ModelRef) -> Option<Arc<dyn Provider>> {
        self.get(&model.provider)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Provider>)> {
        self.providers.iter().map(|(name, provider)| (name.as_str(), provider))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}
