//! Configuration management for the feed collector.
//!
//! Loads configuration from TOML files and provides runtime defaults.

use crate::controller::{ScrollPolicy, ScrollStrategy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Errors reading a config file that exists
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Where the configuration came from.
///
/// Binaries read the file before tracing is installed, so the outcome is
/// kept and logged afterwards with [`ConfigSource::log`].
#[derive(Debug)]
pub enum ConfigSource {
    File(PathBuf),
    Missing(PathBuf),
    Invalid(ConfigError),
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => info!("Loaded configuration from {:?}", path),
            ConfigSource::Missing(path) => {
                info!("No config file found at {:?}, using defaults", path)
            }
            ConfigSource::Invalid(e) => warn!("{}, using defaults", e),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub collector: CollectorConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Scroll strategy as written in the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    Incremental,
    JumpToEnd,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Maximum items returned per run
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,

    #[serde(default)]
    pub strategy: StrategyKind,

    /// Scroll step for the incremental strategy
    #[serde(default = "default_scroll_step")]
    pub scroll_step_px: u64,

    /// Wait after each scroll; defaults depend on the strategy
    #[serde(default)]
    pub settle_ms: Option<u64>,

    /// Wait after each "show more" click
    #[serde(default = "default_expand_pause")]
    pub expand_pause_ms: u64,

    /// Wait before confirming the end of the feed
    #[serde(default = "default_end_grace")]
    pub end_grace_ms: u64,

    /// Cycles without new items before stopping; defaults depend on the strategy
    #[serde(default)]
    pub no_growth_limit: Option<u32>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            batch_limit: default_batch_limit(),
            strategy: StrategyKind::default(),
            scroll_step_px: default_scroll_step(),
            settle_ms: None,
            expand_pause_ms: default_expand_pause(),
            end_grace_ms: default_end_grace(),
            no_growth_limit: None,
        }
    }
}

impl CollectorConfig {
    /// Build the scroll policy these settings describe
    pub fn policy(&self) -> ScrollPolicy {
        let mut policy = match self.strategy {
            StrategyKind::Incremental => ScrollPolicy {
                strategy: ScrollStrategy::Incremental {
                    step_px: self.scroll_step_px,
                },
                ..ScrollPolicy::incremental()
            },
            StrategyKind::JumpToEnd => ScrollPolicy::jump_to_end(),
        };

        if let Some(settle_ms) = self.settle_ms {
            policy.settle = Duration::from_millis(settle_ms);
        }
        if let Some(limit) = self.no_growth_limit {
            policy.no_growth_limit = limit.max(1);
        }
        policy.expand_pause = Duration::from_millis(self.expand_pause_ms);
        policy.end_grace = Duration::from_millis(self.end_grace_ms);
        policy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the remote store
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// Platform tag sent with every batch
    #[serde(default = "default_platform")]
    pub platform: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            platform: default_platform(),
            timeout_secs: default_timeout(),
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// DevTools endpoint of the running browser (http or ws)
    #[serde(default = "default_debugger_url")]
    pub debugger_url: String,

    /// Page opened when no feed tab is found
    #[serde(default = "default_feed_url")]
    pub feed_url: String,

    /// URL fragments identifying an open feed tab
    #[serde(default = "default_feed_markers")]
    pub feed_url_markers: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            debugger_url: default_debugger_url(),
            feed_url: default_feed_url(),
            feed_url_markers: default_feed_markers(),
        }
    }
}

// Default value functions for serde
fn default_log_level() -> String {
    "info".to_string()
}

fn default_batch_limit() -> usize {
    50
}

fn default_scroll_step() -> u64 {
    crate::controller::DEFAULT_STEP_PX
}

fn default_expand_pause() -> u64 {
    300
}

fn default_end_grace() -> u64 {
    1000
}

fn default_backend_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_platform() -> String {
    "twitter".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_debugger_url() -> String {
    "http://127.0.0.1:9222".to_string()
}

fn default_feed_url() -> String {
    "https://x.com/i/bookmarks".to_string()
}

fn default_feed_markers() -> Vec<String> {
    vec!["/i/bookmarks".to_string()]
}

impl Config {
    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Self {
        let (config, source) = Self::read(path);
        source.log();
        config
    }

    /// Read configuration without logging; invalid files fall back to defaults
    pub fn read(path: PathBuf) -> (Self, ConfigSource) {
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return (Self::default(), ConfigSource::Missing(path));
            }
            Err(source) => {
                let error = ConfigError::Read { path, source };
                return (Self::default(), ConfigSource::Invalid(error));
            }
        };

        match toml::from_str(&contents) {
            Ok(config) => (config, ConfigSource::File(path)),
            Err(source) => {
                let error = ConfigError::Parse { path, source };
                (Self::default(), ConfigSource::Invalid(error))
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("feed-collector")
            .join("config.toml")
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: PathBuf) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        std::fs::write(&path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }
}
