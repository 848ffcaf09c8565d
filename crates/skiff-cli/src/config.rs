//! Configuration system for the skiff CLI.

use serde::{Deserialize, Serialize};
use skiff_core::EngineConfig;
use skiff_core::config::MAX_CHUNK_SIZE;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// skiff configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Transfer configuration
    #[serde(default)]
    pub transfer: TransferConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Chunk size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Connect timeout in milliseconds (0: none)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Read timeout in milliseconds (0: none)
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Minimum milliseconds between progress updates
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    /// Progress update every 1/divider of the content (0: off)
    #[serde(default = "default_progress_divider")]
    pub progress_divider: u32,
    /// User-Agent header override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_chunk_size() -> usize {
    skiff_core::config::DEFAULT_CHUNK_SIZE
}

fn default_connect_timeout_ms() -> u64 {
    EngineConfig::default().connect_timeout_ms
}

fn default_read_timeout_ms() -> u64 {
    EngineConfig::default().read_timeout_ms
}

fn default_progress_interval_ms() -> u64 {
    100
}

fn default_progress_divider() -> u32 {
    100
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            progress_interval_ms: default_progress_interval_ms(),
            progress_divider: default_progress_divider(),
            user_agent: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl TransferConfig {
    /// Engine settings for the controller
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        let mut engine = EngineConfig {
            chunk_size: self.chunk_size,
            connect_timeout_ms: self.connect_timeout_ms,
            read_timeout_ms: self.read_timeout_ms,
            ..EngineConfig::default()
        };
        if let Some(agent) = &self.user_agent {
            engine.user_agent.clone_from(agent);
        }
        engine
    }

    /// Progress interval as a `Duration`
    #[must_use]
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("skiff/config.toml")
    }

    /// Load config from default path, or create default if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if reading or creating the config fails.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();

        if path.exists() {
            Self::load(&path)
        } else {
            let config = Self::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        if self.transfer.chunk_size == 0 || self.transfer.chunk_size > MAX_CHUNK_SIZE {
            anyhow::bail!("Chunk size must be between 1 byte and 1MB");
        }

        self.transfer
            .engine_config()
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid transfer settings: {e}"))?;

        Ok(())
    }
}
