//! Application configuration management.
//!
//! Settings are layered with `figment`: built-in defaults, then a TOML file
//! (`--config` or the platform config directory), then `COAUTHORS_*`
//! environment variables. Command-line flags are applied last by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::database::MIN_MAX_JSON_BYTES;

/// Name of the configuration file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "coauthors.toml";

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "COAUTHORS_";

/// Hard ceiling on entries per side, whatever the configuration says.
pub const ENTRIES_PER_SIDE_CEILING: usize = 50;

/// Errors while loading or rendering configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// A layer could not be parsed or has values of the wrong type.
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),

    /// The effective configuration could not be rendered as TOML.
    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the dataset and cache by default.
    pub data_dir: PathBuf,
    /// Dataset path. Defaults to `<data_dir>/dblp.sqlite`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    /// Cache path. Defaults to `<data_dir>/coauthors_cache.sqlite`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_db_path: Option<PathBuf>,
    pub db_busy_timeout_ms: u64,
    pub cache_busy_timeout_ms: u64,
    /// Largest JSON payload written to the cache.
    pub cache_max_json_bytes: usize,
    /// Upper bound for `limit_per_pair`.
    pub max_limit: u32,
    pub max_entries_per_side: usize,
    /// Upper bound for `author_limit`.
    pub max_author_resolve: u32,
    pub max_concurrent_queries: usize,
    /// How long a query waits for a gate slot. Zero never waits.
    pub query_acquire_timeout_ms: u64,
    pub health_cache_ttl_ms: u64,
    /// Overrides the dataset date reported by `stats`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_date: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_path: None,
            cache_db_path: None,
            db_busy_timeout_ms: 30_000,
            cache_busy_timeout_ms: 30_000,
            cache_max_json_bytes: 300_000,
            max_limit: 200,
            max_entries_per_side: 50,
            max_author_resolve: 800,
            max_concurrent_queries: 4,
            query_acquire_timeout_ms: 0,
            health_cache_ttl_ms: 3_000,
            data_date: None,
        }
    }
}

/// Effective query limits after floors and ceilings are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub max_limit: u32,
    pub max_entries_per_side: usize,
    pub max_author_resolve: u32,
    pub max_concurrent_queries: usize,
    pub acquire_timeout: Duration,
}

impl Config {
    /// Build the layered figment for an optional explicit config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if `path` is given but missing.
    pub fn figment(path: Option<&Path>) -> Result<Figment, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                figment = figment.merge(Toml::file(path));
            }
            None => {
                if let Some(default_path) = default_config_path() {
                    log::debug!("Looking for config at {}", default_path.display());
                    figment = figment.merge(Toml::file(default_path));
                }
            }
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Load the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing or any layer is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::figment(path)?
            .extract()
            .map_err(|e| ConfigError::Invalid(Box::new(e)))
    }

    /// Dataset path.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("dblp.sqlite"))
    }

    /// Cache database path.
    #[must_use]
    pub fn cache_db_path(&self) -> PathBuf {
        self.cache_db_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("coauthors_cache.sqlite"))
    }

    #[must_use]
    pub fn db_busy_timeout(&self) -> Duration {
        Duration::from_millis(self.db_busy_timeout_ms)
    }

    #[must_use]
    pub fn cache_busy_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_busy_timeout_ms)
    }

    /// Cache payload ceiling, floored at the minimum the cache accepts.
    #[must_use]
    pub fn cache_max_json_bytes(&self) -> usize {
        self.cache_max_json_bytes.max(MIN_MAX_JSON_BYTES)
    }

    #[must_use]
    pub fn health_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.health_cache_ttl_ms)
    }

    /// Non-blank `data_date` override.
    #[must_use]
    pub fn data_date_override(&self) -> Option<&str> {
        self.data_date
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Query limits with floors and ceilings applied.
    #[must_use]
    pub fn limits(&self) -> QueryLimits {
        QueryLimits {
            max_limit: self.max_limit.max(1),
            max_entries_per_side: self.max_entries_per_side.clamp(1, ENTRIES_PER_SIDE_CEILING),
            max_author_resolve: self.max_author_resolve.max(1),
            max_concurrent_queries: self.max_concurrent_queries.max(1),
            acquire_timeout: Duration::from_millis(self.query_acquire_timeout_ms),
        }
    }

    /// Render the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Render`] if a value has no TOML form.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Default platform-specific configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "coauthors", "coauthors")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("org", "coauthors", "coauthors")
        .map_or_else(|| PathBuf::from("data"), |dirs| dirs.data_dir().to_path_buf())
}
