//! Engine configuration
//!
//! Defines all configurable parameters for the engine including
//! external call timeouts, workflow concurrency, autosave cadence and
//! the dependency risk policy.

use std::time::Duration;

use crate::service::dependency::RiskPolicy;

/// Engine configuration
///
/// All timeouts and intervals are configurable to allow tuning
/// for different deployment scenarios (sandbox vs production tenants).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Artifact service base URL (e.g., "http://localhost:8000")
    pub service_url: String,

    /// Upper bound for every read call against the directory
    pub read_timeout: Duration,

    /// Upper bound for every write call against the transport service
    pub write_timeout: Duration,

    /// Max workflow executions running at the same time
    pub max_parallel_workflows: usize,

    /// How often the configuration store autosaves dirty overrides
    pub autosave_interval: Duration,

    /// Thresholds for dependency risk tiers
    pub risk_policy: RiskPolicy,
}

impl EngineConfig {
    /// Creates a new configuration with defaults
    pub fn new(service_url: String) -> Self {
        Self {
            service_url,
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(120),
            max_parallel_workflows: 4,
            autosave_interval: Duration::from_secs(30),
            risk_policy: RiskPolicy::default(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - FERRY_SERVICE_URL (required)
    /// - FERRY_READ_TIMEOUT (optional, seconds, default: 30)
    /// - FERRY_WRITE_TIMEOUT (optional, seconds, default: 120)
    /// - FERRY_MAX_PARALLEL_WORKFLOWS (optional, default: 4)
    /// - FERRY_AUTOSAVE_INTERVAL (optional, seconds, default: 30)
    /// - FERRY_RISK_HIGH_ABOVE (optional, default: 5)
    /// - FERRY_RISK_MEDIUM_ABOVE (optional, default: 2)
    pub fn from_env() -> anyhow::Result<Self> {
        let service_url = std::env::var("FERRY_SERVICE_URL")
            .map_err(|_| anyhow::anyhow!("FERRY_SERVICE_URL environment variable not set"))?;

        Ok(Self::new(service_url).with_env_overrides())
    }

    /// Applies the optional FERRY_* tuning variables on top of `self`
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(secs) = env_parse::<u64>("FERRY_READ_TIMEOUT") {
            self.read_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = env_parse::<u64>("FERRY_WRITE_TIMEOUT") {
            self.write_timeout = Duration::from_secs(secs);
        }

        if let Some(n) = env_parse::<usize>("FERRY_MAX_PARALLEL_WORKFLOWS") {
            self.max_parallel_workflows = n;
        }

        if let Some(secs) = env_parse::<u64>("FERRY_AUTOSAVE_INTERVAL") {
            self.autosave_interval = Duration::from_secs(secs);
        }

        if let Some(n) = env_parse::<usize>("FERRY_RISK_HIGH_ABOVE") {
            self.risk_policy.high_above = n;
        }

        if let Some(n) = env_parse::<usize>("FERRY_RISK_MEDIUM_ABOVE") {
            self.risk_policy.medium_above = n;
        }

        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.service_url.is_empty() {
            anyhow::bail!("service_url cannot be empty");
        }

        if !self.service_url.starts_with("http://") && !self.service_url.starts_with("https://") {
            anyhow::bail!("service_url must start with http:// or https://");
        }

        if self.read_timeout.is_zero() || self.write_timeout.is_zero() {
            anyhow::bail!("timeouts must be greater than 0");
        }

        if self.max_parallel_workflows == 0 {
            anyhow::bail!("max_parallel_workflows must be greater than 0");
        }

        if self.autosave_interval.is_zero() {
            anyhow::bail!("autosave_interval must be greater than 0");
        }

        if self.risk_policy.medium_above >= self.risk_policy.high_above {
            anyhow::bail!("medium risk threshold must be below the high risk threshold");
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new("http://localhost:8000".to_string())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.read_timeout, Duration::from_secs(30));
        assert_eq!(config.write_timeout, Duration::from_secs(120));
        assert_eq!(config.risk_policy, RiskPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();

        config.service_url = "not-a-url".to_string();
        assert!(config.validate().is_err());

        config.service_url = "https://ferry.example.com".to_string();
        assert!(config.validate().is_ok());

        config.max_parallel_workflows = 0;
        assert!(config.validate().is_err());
        config.max_parallel_workflows = 1;

        config.risk_policy.medium_above = 7;
        assert!(config.validate().is_err());
    }
}
