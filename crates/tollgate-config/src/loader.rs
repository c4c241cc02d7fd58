use std::path::Path;

use rust_decimal::Decimal;

use crate::{BucketConfig, Config, ModelRef};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        let config = Self::from_toml(&raw)?;
        tracing::debug!(
            path = %path.display(),
            providers = config.providers.len(),
            chains = config.chains.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_providers()?;
        self.validate_chains()?;
        self.validate_rate_limit()?;
        self.validate_billing()?;
        Ok(())
    }

    fn validate_providers(&self) -> anyhow::Result<()> {
        if self.providers.is_empty() {
            anyhow::bail!("at least one provider must be configured");
        }

        for (name, provider) in &self.providers {
            if name.contains('/') {
                anyhow::bail!("provider name '{name}' must not contain '/'");
            }
            if provider.timeout.get().is_zero() {
                anyhow::bail!("provider '{name}' timeout must be greater than 0");
            }
            for (model, pricing) in &provider.pricing {
                if pricing.input_per_million.is_sign_negative() || pricing.output_per_million.is_sign_negative() {
                    anyhow::bail!("provider '{name}' pricing for '{model}' must not be negative");
                }
            }
        }

        Ok(())
    }

    fn validate_chains(&self) -> anyhow::Result<()> {
        if self.chains.is_empty() {
            anyhow::bail!("at least one chain must be configured");
        }

        for (name, chain) in &self.chains {
            if chain.models.is_empty() {
                anyhow::bail!("chain '{name}' must list at least one model");
            }
            if chain.max_attempts == 0 {
                anyhow::bail!("chain '{name}' max_attempts must be at least 1");
            }
            if chain.deadline.is_some_and(|d| d.get().is_zero()) {
                anyhow::bail!("chain '{name}' deadline must be greater than 0");
            }

            for entry in &chain.models {
                let Some(model_ref) = ModelRef::parse(entry.model()) else {
                    anyhow::bail!(
                        "chain '{name}' entry '{}' must be written as 'provider/model'",
                        entry.model()
                    );
                };
                if !self.providers.contains_key(&model_ref.provider) {
                    anyhow::bail!(
                        "chain '{name}' references unknown provider '{}'",
                        model_ref.provider
                    );
                }
                if entry.max_attempts() == Some(0) {
                    anyhow::bail!("chain '{name}' entry '{model_ref}' max_attempts must be at least 1");
                }
            }
        }

        Ok(())
    }

    fn validate_rate_limit(&self) -> anyhow::Result<()> {
        validate_bucket("rate_limit.requests", self.rate_limit.requests)?;
        validate_bucket("rate_limit.volume", self.rate_limit.volume)?;
        Ok(())
    }

    fn validate_billing(&self) -> anyhow::Result<()> {
        let billing = &self.billing;

        if billing.workers == 0 {
            anyhow::bail!("billing.workers must be at least 1");
        }
        if billing.queue_capacity == 0 {
            anyhow::bail!("billing.queue_capacity must be at least 1");
        }
        if billing.event_buffer == 0 {
            anyhow::bail!("billing.event_buffer must be at least 1");
        }

        let thresholds = [("daily", billing.thresholds.daily), ("monthly", billing.thresholds.monthly)];
        for (period, limit) in thresholds {
            if limit.is_some_and(|l| l <= Decimal::ZERO) {
                anyhow::bail!("billing.thresholds.{period} must be greater than 0");
            }
        }

        Ok(())
    }
}

fn validate_bucket(name: &str, bucket: BucketConfig) -> anyhow::Result<()> {
    if bucket.capacity == 0 {
        anyhow::bail!("{name}.capacity must be greater than 0");
    }
    if bucket.window().is_zero() {
        anyhow::bail!("{name}.window must be greater than 0");
    }
    Ok(())
}
