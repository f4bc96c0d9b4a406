//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub bucketizer: BucketizerConfig,

    #[serde(default)]
    pub paginator: PaginatorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Relational store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// How long a connection waits on a locked database
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    /// How long a worker's claim on a view lasts if it never releases it
    #[serde(default = "default_claim_lease")]
    pub claim_lease_ms: u64,
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("ldes-server").join("ldes.db").to_string_lossy().to_string())
        .unwrap_or_else(|| "./ldes_data/ldes.db".to_string())
}

fn default_busy_timeout() -> u64 {
    5000
}

fn default_claim_lease() -> u64 {
    60_000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            busy_timeout_ms: default_busy_timeout(),
            claim_lease_ms: default_claim_lease(),
        }
    }
}

impl StorageConfig {
    /// Database path with a leading `~/` expanded to the home directory
    pub fn database_path(&self) -> PathBuf {
        match (self.database_path.strip_prefix("~/"), dirs::home_dir()) {
            (Some(rest), Some(home)) => home.join(rest),
            _ => PathBuf::from(&self.database_path),
        }
    }

    pub fn claim_lease(&self) -> Duration {
        Duration::from_millis(self.claim_lease_ms)
    }
}

/// Bucketizer worker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BucketizerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Delay after an idle tick; `None` runs a single pass
    #[serde(default = "default_bucketizer_delay")]
    pub loop_delay_ms: Option<u64>,

    /// Approximate number of members per tick
    #[serde(default = "default_bucketizer_batch")]
    pub member_batch_size: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_bucketizer_delay() -> Option<u64> {
    Some(2000)
}

fn default_bucketizer_batch() -> usize {
    3000
}

impl Default for BucketizerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            loop_delay_ms: default_bucketizer_delay(),
            member_batch_size: default_bucketizer_batch(),
        }
    }
}

impl BucketizerConfig {
    pub fn loop_delay(&self) -> Option<Duration> {
        self.loop_delay_ms.map(Duration::from_millis)
    }
}

/// Paginator worker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PaginatorConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Delay after an idle tick; `None` runs a single pass
    #[serde(default = "default_paginator_delay")]
    pub loop_delay_ms: Option<u64>,

    /// Approximate number of members per tick
    #[serde(default = "default_paginator_batch")]
    pub member_batch_size: usize,

    /// Page size for views whose definition sets none
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
}

fn default_paginator_delay() -> Option<u64> {
    Some(3000)
}

fn default_paginator_batch() -> usize {
    5000
}

fn default_page_size() -> u32 {
    250
}

impl Default for PaginatorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            loop_delay_ms: default_paginator_delay(),
            member_batch_size: default_paginator_batch(),
            default_page_size: default_page_size(),
        }
    }
}

impl PaginatorConfig {
    pub fn loop_delay(&self) -> Option<Duration> {
        self.loop_delay_ms.map(Duration::from_millis)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("ldes-server").join("config.toml")),
            Some(PathBuf::from("/etc/ldes-server/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Storage overrides
        if let Some(path) = var("LDES_DATABASE") {
            self.storage.database_path = path;
        }

        // Worker overrides; "none" makes the worker run a single pass
        if let Some(delay) = var("LDES_BUCKETIZER_LOOP_DELAY_MS") {
            if let Some(d) = parse_delay(&delay) {
                self.bucketizer.loop_delay_ms = d;
            }
        }
        if let Some(delay) = var("LDES_PAGINATOR_LOOP_DELAY_MS") {
            if let Some(d) = parse_delay(&delay) {
                self.paginator.loop_delay_ms = d;
            }
        }
        if let Some(size) = var("LDES_PAGINATOR_PAGE_SIZE") {
            match size.parse::<u32>() {
                Ok(s) if s > 0 => self.paginator.default_page_size = s,
                _ => tracing::warn!(value = %size, "Ignoring invalid LDES_PAGINATOR_PAGE_SIZE"),
            }
        }

        // Logging overrides
        if let Some(level) = var("LDES_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("LDES_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// `Some(None)` for a one-shot worker, `None` for an unusable value
fn parse_delay(value: &str) -> Option<Option<u64>> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("none") || value.is_empty() {
        return Some(None);
    }
    match value.parse::<u64>() {
        Ok(ms) => Some(Some(ms)),
        Err(_) => {
            tracing::warn!(value = %value, "Ignoring invalid loop delay");
            None
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# LDES Server Configuration
#
# Environment variables override these settings:
# - LDES_DATABASE
# - LDES_BUCKETIZER_LOOP_DELAY_MS ("none" for a single pass)
# - LDES_PAGINATOR_LOOP_DELAY_MS ("none" for a single pass)
# - LDES_PAGINATOR_PAGE_SIZE
# - LDES_LOG_LEVEL
# - LDES_LOG_FORMAT

[storage]
# SQLite database file
database_path = "~/.local/share/ldes-server/ldes.db"

# How long a connection waits on a locked database (ms)
busy_timeout_ms = 5000

# How long a claim on a view survives a crashed worker (ms)
claim_lease_ms = 60000

[bucketizer]
# Run the bucketizer worker in the server
enabled = true

# Pause after a tick without work (ms)
loop_delay_ms = 2000

# Approximate number of members bucketized per tick
member_batch_size = 3000

[paginator]
# Run the paginator worker in the server
enabled = true

# Pause after a tick without work (ms)
loop_delay_ms = 3000

# Approximate number of members paginated per tick
member_batch_size = 5000

# Page size for views that do not set pageSize
default_page_size = 250

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
