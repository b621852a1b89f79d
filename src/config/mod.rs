//! Configuration management for metricregistry
//!
//! Handles loading and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base location for model artifacts
    #[serde(default = "default_model_base_path")]
    pub model_base_path: String,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Database pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Maximum pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait on a locked database
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_base_path: default_model_base_path(),
            database: DatabaseConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

impl Config {
    /// Get the default base directory (~/.metricregistry)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".metricregistry")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    fn paths_for(config_file: &Path) -> PathsConfig {
        let base = config_file.parent().unwrap_or(Path::new("."));
        PathsConfig {
            config_file: config_file.to_path_buf(),
            db_file: base.join("registry.db"),
        }
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.paths = Self::paths_for(config_path);

        config.validate()?;
        Ok(config)
    }

    /// Check if the registry is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.model_base_path.trim().is_empty() {
            return Err(Error::Config(
                "model_base_path must not be empty".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(Error::Config(
                "database.max_connections must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Get the database URL for sqlx
pub fn database_url(config: &Config) -> String {
    format!("sqlite://{}?mode=rwc", config.paths.db_file.display())
}
