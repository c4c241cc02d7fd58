use std::collections::HashMap;

use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

use crate::HumanDuration;

/// Configuration for a single upstream provider
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Provider variant
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    /// API key for authentication
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Upper bound for a single call; the caller's deadline may shorten it
    #[serde(default = "default_timeout")]
    pub timeout: HumanDuration,
    /// Per-model prices used to cost reported usage, keyed by model id
    #[serde(default)]
    pub pricing: HashMap<String, ModelPricing>,
}

/// Supported provider variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    /// OpenRouter: usage resolved through the generation lookup endpoint
    Openrouter,
    /// OpenAI-compatible API: usage resolved from the provider's own report
    Openai,
}

/// Price per million units of input and output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelPricing {
    pub input_per_million: Decimal,
    pub output_per_million: Decimal,
}

impl ModelPricing {
    /// Cost of the given usage, kept at full decimal precision
    pub fn cost(&self, input_units: u64, output_units: u64) -> Decimal {
        let million = Decimal::from(1_000_000u32);
        (Decimal::from(input_units) * self.input_per_million + Decimal::from(output_units) * self.output_per_million)
            / million
    }
}

const fn default_timeout() -> HumanDuration {
    HumanDuration::from_secs(60)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn deserialize_openai_with_pricing() {
        let toml = r#"
            type = "openai"
            api_key = "sk-test"
            timeout = "30s"

            [pricing."gpt-4o-mini"]
            input_per_million = 0.15
            output_per_million = "0.60"
        "#;

        let config: ProviderConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.provider_type, ProviderType::Openai);
        assert_eq!(config.timeout, HumanDuration::from_secs(30));
        assert_eq!(config.pricing["gpt-4o-mini"].output_per_million, dec!(0.60));
    }

    #[test]
    fn default_timeout_applies() {
        let config: ProviderConfig = toml::from_str(r#"type = "openrouter""#).unwrap();
        assert_eq!(config.provider_type, ProviderType::Openrouter);
        assert_eq!(config.timeout, HumanDuration::from_secs(60));
        assert!(config.base_url.is_none());
    }

    #[test]
    fn unknown_provider_type_is_rejected() {
        assert!(toml::from_str::<ProviderConfig>(r#"type = "bedrock""#).is_err());
    }

    #[test]
    fn pricing_is_exact() {
        let pricing = ModelPricing {
            input_per_million: dec!(0.15),
            output_per_million: dec!(0.60),
        };
        assert_eq!(pricing.cost(1_000, 2_000), dec!(0.00135));
        assert_eq!(pricing.cost(0, 0), Decimal::ZERO);
    }
}
