//! Configuration loading and validation.
//!
//! Uses JSON5 so operators can comment their config.
//! Config location: `~/.edue/edue.json`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable overriding the per-minute threshold.
pub const ENV_PER_MINUTE: &str = "RATE_LIMIT_PER_MINUTE";

/// Environment variable overriding the per-hour threshold.
pub const ENV_PER_HOUR: &str = "RATE_LIMIT_PER_HOUR";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON5 parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),

    /// Config validation error.
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Request quota configuration.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Durable storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Chat moderation configuration.
    #[serde(default)]
    pub moderation: ModerationConfig,

    /// Global settings.
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns error if config cannot be loaded or parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a path.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::state_dir().join("edue.json")
    }

    /// Get the Edue state directory.
    ///
    /// Uses `EDUE_STATE_DIR` env var if set, otherwise `~/.edue`.
    #[must_use]
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("EDUE_STATE_DIR") {
            PathBuf::from(dir)
        } else if let Some(home) = dirs::home_dir() {
            home.join(".edue")
        } else {
            PathBuf::from(".edue")
        }
    }

    /// Path of the rate-limit database.
    #[must_use]
    pub fn storage_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| Self::state_dir().join("rate_limits"))
    }

    /// Path of the blocked-word list.
    #[must_use]
    pub fn blacklist_path(&self) -> PathBuf {
        self.moderation
            .blacklist
            .clone()
            .unwrap_or_else(|| Self::state_dir().join("blacklist.txt"))
    }

    /// Path of the allowed-word list.
    #[must_use]
    pub fn whitelist_path(&self) -> PathBuf {
        self.moderation
            .whitelist
            .clone()
            .unwrap_or_else(|| Self::state_dir().join("whitelist.txt"))
    }

    /// Apply `RATE_LIMIT_PER_MINUTE` / `RATE_LIMIT_PER_HOUR` from the process environment.
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set but is not a positive integer.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply threshold overrides from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set but is not a positive integer.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_PER_MINUTE) {
            self.rate_limit.per_minute = parse_threshold(ENV_PER_MINUTE, &value)?;
        }
        if let Some(value) = lookup(ENV_PER_HOUR) {
            self.rate_limit.per_hour = parse_threshold(ENV_PER_HOUR, &value)?;
        }
        self.validate()
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.per_minute == 0 {
            return Err(ConfigError::Validation(
                "rateLimit.perMinute must be positive".to_string(),
            ));
        }
        if self.rate_limit.per_hour == 0 {
            return Err(ConfigError::Validation(
                "rateLimit.perHour must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_threshold(key: &str, value: &str) -> Result<u32, ConfigError> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|e| ConfigError::Validation(format!("{key}={value:?}: {e}")))
}

/// Request quota thresholds.
///
/// Fixed for the lifetime of the process once the limiter is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    /// Maximum admitted requests in any trailing 60 seconds.
    #[serde(default = "default_per_minute")]
    pub per_minute: u32,

    /// Maximum admitted requests in any trailing 3600 seconds.
    #[serde(default = "default_per_hour")]
    pub per_hour: u32,
}

impl RateLimitConfig {
    /// Whether the minute threshold exceeds the hour threshold, leaving the
    /// minute limit unreachable.
    #[must_use]
    pub const fn is_inverted(&self) -> bool {
        self.per_minute > self.per_hour
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: default_per_minute(),
            per_hour: default_per_hour(),
        }
    }
}

const fn default_per_minute() -> u32 {
    5
}

const fn default_per_hour() -> u32 {
    30
}

/// Durable storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Database directory. Defaults to `<state dir>/rate_limits`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Word-list locations for the profanity filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationConfig {
    /// Blocked words, one per line.
    #[serde(default)]
    pub blacklist: Option<PathBuf>,

    /// Allowed words stripped before the blocked-word scan.
    #[serde(default)]
    pub whitelist: Option<PathBuf>,
}

/// Global settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    /// Enable debug logging.
    #[serde(default)]
    pub debug: bool,

    /// Log format.
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format.
    #[default]
    Pretty,
    /// JSON format.
    Json,
}
