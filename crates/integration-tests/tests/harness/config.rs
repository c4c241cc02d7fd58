//! Configuration builder for integration tests
//!
//! Assembles TOML so tests go through the same parsing and validation as
//! the binary.

use tollgate_config::Config;

pub struct ConfigBuilder {
    health: bool,
    providers: Vec<String>,
    chains: Vec<String>,
    lookup_backoff: Vec<&'static str>,
    daily_limit: Option<&'static str>,
    requests_per_minute: u64,
}

impl ConfigBuilder {
    /// Health on, fast lookups, generous limits
    pub fn new() -> Self {
        Self {
            health: true,
            providers: Vec::new(),
            chains: Vec::new(),
            lookup_backoff: vec!["20ms", "40ms"],
            daily_limit: None,
            requests_per_minute: 1000,
        }
    }

    /// Add an OpenRouter-style provider pointed at a mock upstream
    pub fn with_openrouter_provider(mut self, name: &str, base_url: &str) -> Self {
        self.providers.push(format!(
            "[providers.{name}]\ntype = \"openrouter\"\napi_key = \"test-key\"\nbase_url = \"{base_url}\"\ntimeout = \"2s\"\n"
        ));
        self
    }

    /// Add a chain; backoff between retries is kept short
    pub fn with_chain(mut self, name: &str, models: &[&str], max_attempts: u32) -> Self {
        let models = models.iter().map(|m| format!("\"{m}\"")).collect::<Vec<_>>().join(", ");
        self.chains.push(format!(
            "[chains.{name}]\nmodels = [{models}]\nmax_attempts = {max_attempts}\nbackoff = [\"10ms\"]\n"
        ));
        self
    }

    pub fn with_lookup_backoff(mut self, delays: &[&'static str]) -> Self {
        self.lookup_backoff = delays.to_vec();
        self
    }

    pub fn with_daily_limit(mut self, limit: &'static str) -> Self {
        self.daily_limit = Some(limit);
        self
    }

    pub fn with_requests_per_minute(mut self, capacity: u64) -> Self {
        self.requests_per_minute = capacity;
        self
    }

    pub fn without_health(mut self) -> Self {
        self.health = false;
        self
    }

    pub fn build(self) -> Config {
        let mut toml = format!(
            "[server]\nlisten_address = \"127.0.0.1:0\"\n\n[server.health]\nenabled = {}\n\n",
            self.health
        );

        for section in self.providers.iter().chain(&self.chains) {
            toml.push_str(section);
            toml.push('\n');
        }

        toml.push_str(&format!(
            "[rate_limit]\nmax_wait = \"50ms\"\nrequests = {{ capacity = {}, window = \"1m\" }}\n\
             volume = {{ capacity = 10000000, window = \"1m\" }}\n\n",
            self.requests_per_minute
        ));

        let backoff = self
            .lookup_backoff
            .iter()
            .map(|d| format!("\"{d}\""))
            .collect::<Vec<_>>()
            .join(", ");
        toml.push_str(&format!("[billing]\nworkers = 2\nlookup_backoff = [{backoff}]\n"));
        if let Some(limit) = self.daily_limit {
            toml.push_str(&format!("\n[billing.thresholds]\ndaily = \"{limit}\"\n"));
        }

        Config::from_toml(&toml).expect("test config is valid")
    }
}
