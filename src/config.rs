//! Queue configuration.
//!
//! A `QueueConfig` names the Redis server, the key prefix and the
//! distribution pools of one queue. It can be built in code, read from
//! environment variables, or loaded from a YAML file of the form:
//!
//! ```yaml
//! globals:
//!   default_prefix: orders
//!   redis_host: localhost   # optional
//!   redis_port: 6379        # optional
//!   stats_mode: best_effort # optional: best_effort | locked
//!   segment_order: as_stored # optional: as_stored | sorted
//! distribution_pools:
//!   regions: [us-east, us-west, eu-central]
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::pool::{DistributionPoolConfig, SegmentOrder};
use crate::stats::{LockSettings, StatsMode};

/// Conventional Redis port.
pub const DEFAULT_REDIS_PORT: u16 = 6379;

const DEFAULT_REDIS_HOST: &str = "localhost";
const DEFAULT_PREFIX: &str = "queue";

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The YAML document could not be parsed.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Configuration of one queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// Redis host name.
    pub redis_host: String,
    /// Redis port.
    pub redis_port: u16,
    /// Prefix every key of this queue is derived from.
    pub prefix: String,
    /// Pools by name.
    pub distribution_pools: BTreeMap<String, Vec<String>>,
    /// How stats read-modify-write cycles are applied.
    pub stats_mode: StatsMode,
    /// Lock tuning when `stats_mode` is `Locked`.
    pub lock: LockSettings,
    /// How pool segment snapshots are ordered.
    pub segment_order: SegmentOrder,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_host: DEFAULT_REDIS_HOST.to_string(),
            redis_port: DEFAULT_REDIS_PORT,
            prefix: DEFAULT_PREFIX.to_string(),
            distribution_pools: BTreeMap::new(),
            stats_mode: StatsMode::default(),
            lock: LockSettings::default(),
            segment_order: SegmentOrder::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct YamlDocument {
    globals: YamlGlobals,
    #[serde(default)]
    distribution_pools: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct YamlGlobals {
    default_prefix: String,
    #[serde(default)]
    redis_host: Option<String>,
    #[serde(default)]
    redis_port: Option<u16>,
    #[serde(default)]
    stats_mode: Option<StatsMode>,
    #[serde(default)]
    segment_order: Option<SegmentOrder>,
}

impl QueueConfig {
    /// Creates a configuration with default values and the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `QUEUE_REDIS_HOST`: Redis host (default: localhost)
    /// - `QUEUE_REDIS_PORT`: Redis port (default: 6379)
    /// - `QUEUE_PREFIX`: Key prefix (default: queue)
    /// - `QUEUE_STATS_MODE`: `best_effort` or `locked` (default: best_effort)
    /// - `QUEUE_SEGMENT_ORDER`: `as_stored` or `sorted` (default: as_stored)
    /// - `QUEUE_LOCK_TTL_MS`: Stats lock expiry in milliseconds (default: 2000)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("QUEUE_REDIS_HOST") {
            config.redis_host = val;
        }

        if let Ok(val) = std::env::var("QUEUE_REDIS_PORT") {
            config.redis_port = parse_env_value(&val, "QUEUE_REDIS_PORT")?;
        }

        if let Ok(val) = std::env::var("QUEUE_PREFIX") {
            config.prefix = val;
        }

        if let Ok(val) = std::env::var("QUEUE_STATS_MODE") {
            config.stats_mode = parse_env_value(&val, "QUEUE_STATS_MODE")?;
        }

        if let Ok(val) = std::env::var("QUEUE_SEGMENT_ORDER") {
            config.segment_order = parse_env_value(&val, "QUEUE_SEGMENT_ORDER")?;
        }

        if let Ok(val) = std::env::var("QUEUE_LOCK_TTL_MS") {
            let millis: u64 = parse_env_value(&val, "QUEUE_LOCK_TTL_MS")?;
            config.lock.ttl = Duration::from_millis(millis);
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parses configuration from a YAML document.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let doc: YamlDocument = serde_yaml::from_str(content)?;
        let mut config = Self::new(doc.globals.default_prefix);

        if let Some(host) = doc.globals.redis_host {
            config.redis_host = host;
        }
        if let Some(port) = doc.globals.redis_port {
            config.redis_port = port;
        }
        if let Some(mode) = doc.globals.stats_mode {
            config.stats_mode = mode;
        }
        if let Some(order) = doc.globals.segment_order {
            config.segment_order = order;
        }
        config.distribution_pools = doc.distribution_pools;

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redis_host.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "redis_host cannot be empty".to_string(),
            ));
        }

        if self.redis_port == 0 {
            return Err(ConfigError::ValidationFailed(
                "redis_port must be greater than 0".to_string(),
            ));
        }

        if self.prefix.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "prefix cannot be empty".to_string(),
            ));
        }

        for (name, segments) in &self.distribution_pools {
            if name.is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "distribution pool names cannot be empty".to_string(),
                ));
            }
            // Segments end up inside message ids, where ':' is the separator.
            if let Some(bad) = segments.iter().find(|s| s.is_empty() || s.contains(':')) {
                return Err(ConfigError::ValidationFailed(format!(
                    "pool '{}' has invalid segment '{}': segments must be non-empty and must not contain ':'",
                    name, bad
                )));
            }
        }

        if self.stats_mode == StatsMode::Locked {
            // PX takes whole milliseconds.
            if self.lock.ttl.as_millis() < 1 {
                return Err(ConfigError::ValidationFailed(
                    "lock ttl must be at least 1 ms".to_string(),
                ));
            }
            if self.lock.max_attempts == 0 {
                return Err(ConfigError::ValidationFailed(
                    "lock max_attempts must be greater than 0".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Connection URL for the configured Redis server.
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.redis_host, self.redis_port)
    }

    /// Pools as `DistributionPoolConfig`s, in name order.
    pub fn pool_configs(&self) -> Vec<DistributionPoolConfig> {
        self.distribution_pools
            .iter()
            .map(|(name, segments)| DistributionPoolConfig::new(name.clone(), segments.clone()))
            .collect()
    }

    /// Builder method to set the Redis host.
    pub fn with_redis_host(mut self, host: impl Into<String>) -> Self {
        self.redis_host = host.into();
        self
    }

    /// Builder method to set the Redis port.
    pub fn with_redis_port(mut self, port: u16) -> Self {
        self.redis_port = port;
        self
    }

    /// Builder method to declare a distribution pool.
    pub fn with_pool<S: Into<String>>(
        mut self,
        name: impl Into<String>,
        segments: impl IntoIterator<Item = S>,
    ) -> Self {
        self.distribution_pools.insert(
            name.into(),
            segments.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Builder method to set the stats mode.
    pub fn with_stats_mode(mut self, mode: StatsMode) -> Self {
        self.stats_mode = mode;
        self
    }

    /// Builder method to set the stats lock tuning.
    pub fn with_lock_settings(mut self, lock: LockSettings) -> Self {
        self.lock = lock;
        self
    }

    /// Builder method to set the segment order.
    pub fn with_segment_order(mut self, order: SegmentOrder) -> Self {
        self.segment_order = order;
        self
    }
}

/// Parses an environment variable value.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("cannot parse '{}'", value),
    })
}
