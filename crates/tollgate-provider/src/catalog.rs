//! Startup check that every chain model exists upstream

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;
use tollgate_config::{ChainConfig, ModelRef};

use crate::error::ProviderError;
use crate::registry::ProviderRegistry;

/// A chain entry the upstream catalog does not offer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingModel {
    pub chain: String,
    pub model: String,
}

impl fmt::Display for MissingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (chain '{}')", self.model, self.chain)
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Every missing model, reported together
    #[error("models not offered upstream: {}", join(.0))]
    MissingModels(Vec<MissingModel>),

    #[error("chain '{chain}' references unknown provider in '{model}'")]
    UnknownProvider { chain: String, model: String },

    #[error("failed to list models for provider '{provider}': {source}")]
    Listing {
        provider: String,
        #[source]
        source: ProviderError,
    },
}

fn join(missing: &[MissingModel]) -> String {
    missing.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Verifies chain entries against each provider's model list
///
/// Each provider is listed at most once however many chains use it.
pub struct ModelCatalogValidator<'a> {
    registry: &'a ProviderRegistry,
}

impl<'a> ModelCatalogValidator<'a> {
    pub const fn new(registry: &'a ProviderRegistry) -> Self {
        Self { registry }
    }

    pub async fn validate(&self, chains: &IndexMap<String, ChainConfig>) -> Result<(), CatalogError> {
        // provider -> model -> chains using it
        let mut wanted: BTreeMap<String, BTreeMap<String, BTreeSet<String>>> = BTreeMap::new();

        for (chain_name, chain) in chains {
            for entry in &chain.models {
                let Some(model_ref) = ModelRef::parse(entry.model()).filter(|m| self.registry.resolve(m).is_some())
                else {
                    return Err(CatalogError::UnknownProvider {
                        chain: chain_name.clone(),
                        model: entry.model().to_owned(),
                    });
                };

                wanted
                    .entry(model_ref.provider)
                    .or_default()
                    .entry(model_ref.model)
                    .or_default()
                    .insert(chain_name.clone());
            }
        }

        let mut missing = Vec::new();

        for (provider_name, models) in wanted {
            let Some(provider) = self.registry.get(&provider_name) else {
                continue;
            };

            let available = provider
                .list_available_models()
                .await
                .map_err(|source| CatalogError::Listing {
                    provider: provider_name.clone(),
                    source,
                })?;

            tracing::debug!(provider = %provider_name, count = available.len(), "fetched model catalog");

            for (model, chains_using) in models {
                if available.contains(&model) {
                    continue;
                }
                for chain in chains_using {
                    missing.push(MissingModel {
                        chain,
                        model: format!("{provider_name}/{model}"),
                    });
                }
            }
        }

        if !missing.is_empty() {
            return Err(CatalogError::MissingModels(missing));
        }

        tracing::info!(chains = chains.len(), "model catalog validated");
        Ok(())
    }
}
