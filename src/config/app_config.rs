//! Application-level configuration
//!
//! Defines the top-level application configuration: durable store location
//! and write cadence, sync schedule, and logging.

use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Embedded default configuration file
const DEFAULT_CONFIG: &str = include_str!("../../contact-sync.config.toml");

/// Configuration file name
const CONFIG_FILE_NAME: &str = "contact-sync.config.toml";

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Durable store configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// Sync schedule and sources
    #[serde(default)]
    pub sync: SyncConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from file or create a default configuration
    pub fn load() -> Result<Self> {
        // Try to load from contact-sync.config.toml in current directory
        if let Ok(content) = std::fs::read_to_string(CONFIG_FILE_NAME) {
            return toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", CONFIG_FILE_NAME, e));
        }

        // Try to load from ~/.contact-sync/contact-sync.config.toml
        if let Some(base_dirs) = BaseDirs::new() {
            let home_config = base_dirs
                .home_dir()
                .join(".contact-sync")
                .join(CONFIG_FILE_NAME);
            if let Ok(content) = std::fs::read_to_string(&home_config) {
                return toml::from_str(&content).map_err(|e| {
                    anyhow::anyhow!("Failed to parse {}: {}", home_config.display(), e)
                });
            }
        }

        // Try to load from environment variable CONTACT_SYNC_CONFIG
        if let Ok(config_path) = std::env::var("CONTACT_SYNC_CONFIG") {
            if let Ok(content) = std::fs::read_to_string(&config_path) {
                return toml::from_str(&content)
                    .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e));
            }
        }

        // No config file found - create one from embedded default
        eprintln!(
            "No configuration file found. Creating {} with default settings...",
            CONFIG_FILE_NAME
        );
        if let Err(e) = std::fs::write(CONFIG_FILE_NAME, DEFAULT_CONFIG) {
            eprintln!("Warning: Could not create {}: {}", CONFIG_FILE_NAME, e);
            eprintln!("Continuing with default configuration in memory.");
        }

        Self::embedded_default()
    }

    /// Load configuration from a specific file path
    /// If the file doesn't exist, creates it with default settings
    pub fn load_from_file(path: &std::path::Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                anyhow::anyhow!("Failed to parse config file {}: {}", path.display(), e)
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!(
                    "Configuration file not found at {}. Creating with default settings...",
                    path.display()
                );

                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .context(format!("Failed to create directory {}", parent.display()))?;
                }

                std::fs::write(path, DEFAULT_CONFIG).context(format!(
                    "Failed to create config file at {}",
                    path.display()
                ))?;

                Self::embedded_default()
            }
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            )),
        }
    }

    /// Parse the configuration compiled into the binary
    pub fn embedded_default() -> Result<Self> {
        toml::from_str(DEFAULT_CONFIG)
            .map_err(|e| anyhow::anyhow!("Failed to parse embedded default config: {}", e))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(anyhow::anyhow!("Invalid log level: {}", self.logging.level)),
        }

        if self.sync.batch_size == 0 {
            return Err(anyhow::anyhow!("Sync batch size must be greater than 0"));
        }

        if self.sync.interval_secs == 0 {
            return Err(anyhow::anyhow!("Sync interval must be greater than 0"));
        }

        if self.store.history_retention == 0 {
            return Err(anyhow::anyhow!(
                "History retention must keep at least one event"
            ));
        }

        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(db_path) = std::env::var("CONTACT_SYNC_DB_PATH") {
            self.store.path = PathBuf::from(db_path);
        }
        if let Ok(level) = std::env::var("CONTACT_SYNC_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(value) = std::env::var("CONTACT_SYNC_DEBOUNCE_MS") {
            if let Ok(ms) = value.parse::<u64>() {
                self.store.debounce_ms = ms;
            }
        }
        if let Ok(value) = std::env::var("CONTACT_SYNC_INTERVAL_SECS") {
            if let Ok(secs) = value.parse::<u64>() {
                self.sync.interval_secs = secs;
            }
        }
    }

    /// Get a summary of the configuration
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("Configuration loaded:\n");
        summary.push_str(&format!("Database: {}\n", self.store.path.display()));
        summary.push_str(&format!("Write Debounce: {}ms\n", self.store.debounce_ms));
        summary.push_str(&format!(
            "History Retention: {} events\n",
            self.store.history_retention
        ));
        summary.push_str(&format!("Sync Interval: {}s\n", self.sync.interval_secs));
        summary.push_str(&format!("Sync Batch Size: {}\n", self.sync.batch_size));
        summary.push_str(&format!(
            "Sources: device={}, cloud={}\n",
            self.sync.device_enabled, self.sync.cloud_enabled
        ));
        summary.push_str(&format!("Logging Level: {}\n", self.logging.level));
        summary
    }
}

/// Durable store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the database file
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Quiet period before a snapshot write (milliseconds)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// History events per record kept in memory
    #[serde(default = "default_history_retention")]
    pub history_retention: usize,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("contacts.duckdb")
}

fn default_debounce_ms() -> u64 {
    2000
}

fn default_history_retention() -> usize {
    20
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            debounce_ms: default_debounce_ms(),
            history_retention: default_history_retention(),
        }
    }
}

/// Sync schedule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between scheduled passes
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Seconds before the first pass after startup
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
    /// Records per bulk batch before yielding
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Attach the device address book source
    #[serde(default)]
    pub device_enabled: bool,
    /// Attach the cloud directory source
    #[serde(default)]
    pub cloud_enabled: bool,
}

fn default_interval_secs() -> u64 {
    1800
}

fn default_initial_delay_secs() -> u64 {
    5
}

fn default_batch_size() -> usize {
    50
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            initial_delay_secs: default_initial_delay_secs(),
            batch_size: default_batch_size(),
            device_enabled: false,
            cloud_enabled: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
