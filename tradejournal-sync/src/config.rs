//! Serializable sync configuration (TOML).
//!
//! Captures everything a run needs that is not a trade: how to reach the
//! remote journal, which collection holds which record kind, and the pacing
//! of the job scheduler.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tradejournal_core::domain::{CollectionId, LATEST_VERSION};
use tradejournal_core::remote::NotionSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("environment variable {0} is not set (remote journal token)")]
    MissingToken(String),
}

/// How to reach the remote journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    /// Name of the environment variable holding the integration token.
    pub token_env: String,
    pub api_version: String,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.notion.com".into(),
            token_env: "NOTION_TOKEN".into(),
            api_version: "2022-06-28".into(),
            timeout_secs: 30,
        }
    }
}

/// Remote collection ids. Trade collections are keyed by metadata version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionsConfig {
    pub tickers: CollectionId,
    pub dates: CollectionId,
    #[serde(default)]
    pub trades: BTreeMap<String, CollectionId>,
}

impl CollectionsConfig {
    /// Single trade collection used for the latest metadata version.
    pub fn new(tickers: CollectionId, dates: CollectionId, trades: CollectionId) -> Self {
        let mut map = BTreeMap::new();
        map.insert(LATEST_VERSION.to_string(), trades);
        Self {
            tickers,
            dates,
            trades: map,
        }
    }

    pub fn with_version(mut self, version: u32, collection: CollectionId) -> Self {
        self.trades.insert(version.to_string(), collection);
        self
    }

    /// Trade collection for a metadata version. Records without metadata
    /// go to the latest version's collection.
    pub fn trade_collection(&self, version: Option<u32>) -> Option<&CollectionId> {
        let version = version.unwrap_or(LATEST_VERSION);
        self.trades.get(&version.to_string())
    }
}

/// Pacing of the cooperative scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Courtesy delay between two items that hit the network.
    pub step_delay_ms: u64,
    /// Linear backoff unit: the n-th retry waits `n × retry_base_ms`.
    pub retry_base_ms: u64,
    pub max_retries: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: 1_000,
            retry_base_ms: 1_000,
            max_retries: 3,
        }
    }
}

impl ScheduleConfig {
    /// No waiting at all; for tests and dry runs.
    pub fn immediate() -> Self {
        Self {
            step_delay_ms: 0,
            retry_base_ms: 0,
            ..Self::default()
        }
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub remote: RemoteConfig,
    pub collections: CollectionsConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl SyncConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Write the config as TOML. Creates parent directories if needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collections.tickers.as_str().trim().is_empty() {
            return Err(ConfigError::Invalid("collections.tickers is empty".into()));
        }
        if self.collections.dates.as_str().trim().is_empty() {
            return Err(ConfigError::Invalid("collections.dates is empty".into()));
        }
        if self.collections.trades.is_empty() {
            return Err(ConfigError::Invalid(
                "collections.trades needs at least one metadata version".into(),
            ));
        }
        for (version, id) in &self.collections.trades {
            if version.parse::<u32>().is_err() {
                return Err(ConfigError::Invalid(format!(
                    "collections.trades key '{version}' is not a metadata version number"
                )));
            }
            if id.as_str().trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "collections.trades.{version} is empty"
                )));
            }
        }
        if self.schedule.max_retries > 10 {
            return Err(ConfigError::Invalid(format!(
                "schedule.max_retries = {} (at most 10)",
                self.schedule.max_retries
            )));
        }
        if self.schedule.retry_base_ms == 0 {
            return Err(ConfigError::Invalid("schedule.retry_base_ms must be > 0".into()));
        }
        if self.remote.timeout_secs == 0 {
            return Err(ConfigError::Invalid("remote.timeout_secs must be > 0".into()));
        }
        Ok(())
    }

    /// Resolve HTTP client settings, reading the token from the environment.
    pub fn notion_settings(&self) -> Result<NotionSettings, ConfigError> {
        let token = std::env::var(&self.remote.token_env)
            .map_err(|_| ConfigError::MissingToken(self.remote.token_env.clone()))?;
        Ok(NotionSettings {
            base_url: self.remote.base_url.clone(),
            token,
            api_version: self.remote.api_version.clone(),
            timeout_secs: self.remote.timeout_secs,
        })
    }

    /// Starter config with placeholder collection ids.
    pub fn template() -> Self {
        Self {
            remote: RemoteConfig::default(),
            collections: CollectionsConfig::new(
                CollectionId::new("<tickers database id>"),
                CollectionId::new("<days database id>"),
                CollectionId::new("<trades v2 database id>"),
            )
            .with_version(1, CollectionId::new("<trades v1 database id>")),
            schedule: ScheduleConfig::default(),
        }
    }
}
