//! Ingest-side configuration
//!
//! Read from `ratelink-ingest.toml` (see `ratelink_common::config` for the
//! lookup order). The resolver URL can additionally be overridden with
//! `RATELINK_IDS_URL`, which wins over the file.

use ratelink_common::config::{load_toml_config, resolve_config_path};
use ratelink_common::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_ENV_VAR: &str = "RATELINK_INGEST_CONFIG";
pub const CONFIG_FILE_NAME: &str = "ratelink-ingest.toml";
pub const RESOLVER_URL_ENV_VAR: &str = "RATELINK_IDS_URL";

/// Batch-resolve client settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResolverClientSettings {
    pub base_url: String,
    /// Items per POST; the service rejects more than 1000
    pub batch_size: usize,
    /// Pause after a 503 before retrying the same batch
    pub unavailable_delay_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ResolverClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            batch_size: 1000,
            unavailable_delay_secs: 60,
            request_timeout_secs: 300,
        }
    }
}

impl ResolverClientSettings {
    pub fn unavailable_delay(&self) -> Duration {
        Duration::from_secs(self.unavailable_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Concurrency limits for scraper HTTP traffic
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PermitSettings {
    /// Requests in flight across all sources
    pub global: usize,
    /// Requests in flight against one source
    pub per_source: usize,
    pub request_timeout_secs: u64,
}

impl Default for PermitSettings {
    fn default() -> Self {
        Self {
            global: 16,
            per_source: 4,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub resolver: ResolverClientSettings,
    pub permits: PermitSettings,
}

impl IngestConfig {
    /// Load from the resolved config file, then apply environment overrides
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(cli_path, CONFIG_ENV_VAR, CONFIG_FILE_NAME);
        let mut config: IngestConfig = load_toml_config(path.as_deref())?;

        if let Ok(url) = std::env::var(RESOLVER_URL_ENV_VAR) {
            if !url.trim().is_empty() {
                config.resolver.base_url = url.trim().to_string();
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.resolver.batch_size == 0 || self.resolver.batch_size > 1000 {
            return Err(Error::Config(format!(
                "resolver.batch_size must be within 1..=1000, got {}",
                self.resolver.batch_size
            )));
        }
        if self.permits.global == 0 || self.permits.per_source == 0 {
            return Err(Error::Config("permit limits must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.resolver.batch_size, 1000);
        assert_eq!(config.resolver.unavailable_delay(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: IngestConfig = toml::from_str(
            "[resolver]\nbase_url = \"http://ids:9000\"\n\n[permits]\nper_source = 2\n",
        )
        .unwrap();
        assert_eq!(config.resolver.base_url, "http://ids:9000");
        assert_eq!(config.resolver.batch_size, 1000);
        assert_eq!(config.permits.per_source, 2);
        assert_eq!(config.permits.global, 16);
    }

    #[test]
    fn test_oversized_batch_rejected() {
        let mut config = IngestConfig::default();
        config.resolver.batch_size = 1001;
        assert!(config.validate().is_err());
    }
}
