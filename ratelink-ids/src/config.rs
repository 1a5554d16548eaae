//! Service configuration
//!
//! Each setting is taken from the first source that provides it:
//! 1. Command-line flag
//! 2. Environment variable (via clap's `env`)
//! 3. TOML config file (`--config` / `RATELINK_CONFIG`, else the per-user
//!    config directory)
//! 4. Compiled default
//!
//! The program catalog only comes from the TOML file.

use clap::Parser;
use ratelink_common::config::{load_toml_config, resolve_config_path};
use ratelink_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::db::DEFAULT_MAX_LOCK_WAIT_MS;
use crate::registry::RosterKind;
use crate::utils::backoff::{RetryPolicy, RetryPolicyFile};

pub const CONFIG_FILE_NAME: &str = "ratelink-ids.toml";
pub const CONFIG_ENV_VAR: &str = "RATELINK_CONFIG";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8081";
pub const DEFAULT_REGISTRY_URL: &str = "https://www.gosuslugi.ru/api/university/v1/public";
pub const DEFAULT_MAX_BATCH_ITEMS: usize = 1000;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "ratelink-ids")]
#[command(about = "Resolves university-local applicant IDs to national registry IDs")]
#[command(version)]
pub struct Args {
    /// TOML config file
    #[arg(short, long, env = "RATELINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long, env = "RATELINK_IDS_BIND")]
    pub bind: Option<String>,

    /// SQLite database file
    #[arg(long, env = "RATELINK_IDS_DATABASE")]
    pub database: Option<PathBuf>,

    /// Registry API base URL
    #[arg(long, env = "RATELINK_REGISTRY_URL")]
    pub registry_url: Option<String>,
}

/// Registry list IDs of one program; empty strings mean "not published"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramConfig {
    pub name: String,
    #[serde(default)]
    pub regular_bvi: String,
    #[serde(default)]
    pub special_quota: String,
    #[serde(default)]
    pub target_quota: String,
    #[serde(default)]
    pub dedicated_quota: String,
}

impl ProgramConfig {
    /// Published lists in fetch order
    pub fn lists(&self) -> Vec<(RosterKind, &str)> {
        RosterKind::ALL
            .into_iter()
            .map(|kind| {
                let id = match kind {
                    RosterKind::RegularBvi => &self.regular_bvi,
                    RosterKind::SpecialQuota => &self.special_quota,
                    RosterKind::TargetQuota => &self.target_quota,
                    RosterKind::DedicatedQuota => &self.dedicated_quota,
                };
                (kind, id.trim())
            })
            .filter(|(_, id)| !id.is_empty())
            .collect()
    }
}

/// `[fetch]` table of the config file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FetchFileConfig {
    pub interval_secs: Option<u64>,
    pub initial_fetch_after_secs: Option<u64>,
    pub stale_after_secs: Option<u64>,
    pub ready_window_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub request_spacing_ms: Option<u64>,
    pub program_spacing_ms: Option<u64>,
    pub retry: RetryPolicyFile,
}

/// Config file contents; every field optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub bind_addr: Option<String>,
    pub database_path: Option<PathBuf>,
    pub registry_base_url: Option<String>,
    pub max_batch_items: Option<usize>,
    pub memory_ttl_secs: Option<u64>,
    pub max_lock_wait_ms: Option<u64>,
    pub fetch: FetchFileConfig,
    pub programs: Vec<ProgramConfig>,
}

/// Timing of the background fetcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    /// Period between cycles
    pub interval: Duration,
    /// At startup, fetch immediately if the last success is older than this
    pub initial_fetch_after: Duration,
    /// Resolve requests trigger a fetch when data is older than this
    pub stale_after: Duration,
    /// Service is ready while the last success is younger than this
    pub ready_window: Duration,
    /// Per-attempt budget of one roster download
    pub request_timeout: Duration,
    pub request_spacing: Duration,
    pub program_spacing: Duration,
    pub retry: RetryPolicy,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(45 * 60),
            initial_fetch_after: Duration::from_secs(60 * 60),
            stale_after: Duration::from_secs(60 * 60),
            ready_window: Duration::from_secs(45 * 60),
            request_timeout: Duration::from_secs(60),
            request_spacing: Duration::from_millis(200),
            program_spacing: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        }
    }
}

impl FetchSettings {
    fn merged_with(self, file: &FetchFileConfig) -> Self {
        let secs = |v: Option<u64>, d: Duration| v.map(Duration::from_secs).unwrap_or(d);
        let millis = |v: Option<u64>, d: Duration| v.map(Duration::from_millis).unwrap_or(d);

        Self {
            interval: secs(file.interval_secs, self.interval),
            initial_fetch_after: secs(file.initial_fetch_after_secs, self.initial_fetch_after),
            stale_after: secs(file.stale_after_secs, self.stale_after),
            ready_window: secs(file.ready_window_secs, self.ready_window),
            request_timeout: secs(file.request_timeout_secs, self.request_timeout),
            request_spacing: millis(file.request_spacing_ms, self.request_spacing),
            program_spacing: millis(file.program_spacing_ms, self.program_spacing),
            retry: self.retry.merged_with(&file.retry),
        }
    }
}

/// Fully resolved configuration of the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub registry_base_url: String,
    pub max_batch_items: usize,
    /// TTL of the in-memory cache layers
    pub memory_ttl: Duration,
    pub max_lock_wait_ms: u64,
    pub fetch: FetchSettings,
    pub programs: Vec<ProgramConfig>,
}

/// Default location of the service database
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ratelink")
        .join("ratelink-ids.db")
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            database_path: default_database_path(),
            registry_base_url: DEFAULT_REGISTRY_URL.to_string(),
            max_batch_items: DEFAULT_MAX_BATCH_ITEMS,
            memory_ttl: Duration::from_secs(30 * 60),
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
            fetch: FetchSettings::default(),
            programs: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Resolve the configuration from CLI/ENV arguments and the config file
    pub fn load(args: &Args) -> Result<Self> {
        let path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR, CONFIG_FILE_NAME);
        let file: FileConfig = load_toml_config(path.as_deref())?;
        Self::from_sources(args, file)
    }

    /// Merge already-parsed sources over the defaults
    pub fn from_sources(args: &Args, file: FileConfig) -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            bind_addr: args
                .bind
                .clone()
                .or(file.bind_addr)
                .unwrap_or(defaults.bind_addr),
            database_path: args
                .database
                .clone()
                .or(file.database_path)
                .unwrap_or(defaults.database_path),
            registry_base_url: args
                .registry_url
                .clone()
                .or(file.registry_base_url)
                .unwrap_or(defaults.registry_base_url),
            max_batch_items: file.max_batch_items.unwrap_or(defaults.max_batch_items),
            memory_ttl: file
                .memory_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.memory_ttl),
            max_lock_wait_ms: file.max_lock_wait_ms.unwrap_or(defaults.max_lock_wait_ms),
            fetch: defaults.fetch.merged_with(&file.fetch),
            programs: file.programs,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_batch_items == 0 {
            return Err(Error::Config("max_batch_items must be at least 1".to_string()));
        }

        let mut names = HashSet::new();
        for program in &self.programs {
            if program.name.trim().is_empty() {
                return Err(Error::Config("program with an empty name".to_string()));
            }
            if !names.insert(program.name.as_str()) {
                return Err(Error::Config(format!("duplicate program: {}", program.name)));
            }
        }

        if self.programs.is_empty() {
            tracing::warn!("No programs configured; every ID will resolve to a fallback identity");
        }
        Ok(())
    }
}
