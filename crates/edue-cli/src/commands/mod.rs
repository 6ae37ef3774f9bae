//! CLI command implementations.

pub mod check;
pub mod config;
pub mod filter;
pub mod reset;
pub mod stats;

pub use check::run_check;
pub use config::run_config;
pub use filter::run_filter;
pub use reset::run_reset;
pub use stats::run_stats;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use edue_core::Config;
use edue_ratelimit::{RateLimiter, SledStore, SystemClock};

/// Configuration shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    /// Effective configuration.
    pub config: Config,
    /// Where the configuration was (or would be) read from.
    pub config_path: PathBuf,
}

impl Context {
    /// Load the configuration.
    ///
    /// An explicit `config_path` must exist; the default path may be absent,
    /// in which case the defaults apply. `data_dir` relocates every file the
    /// config does not name explicitly.
    ///
    /// # Errors
    ///
    /// Returns error if the config file cannot be read or is invalid.
    pub fn load(config_path: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<Self> {
        let (config_path, explicit) = match config_path {
            Some(path) => (path, true),
            None => (Config::default_path(), false),
        };

        let mut config = if config_path.exists() {
            Config::load(&config_path)
                .with_context(|| format!("Failed to load {}", config_path.display()))?
        } else if explicit {
            anyhow::bail!("Config file not found: {}", config_path.display());
        } else {
            Config::default()
        };

        if let Some(dir) = data_dir {
            relocate(&mut config, &dir);
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Open the rate-limit database.
    ///
    /// # Errors
    ///
    /// Returns error if sled fails to open.
    pub fn open_store(&self) -> Result<Arc<SledStore>> {
        let path = self.config.storage_path();
        let store = SledStore::open(&path)
            .with_context(|| format!("Failed to open rate limit store at {}", path.display()))?;
        Ok(Arc::new(store))
    }

    /// Build a limiter over `store` on the system clock.
    ///
    /// # Errors
    ///
    /// Returns error if the store's schema cannot be prepared.
    pub async fn open_limiter(&self, store: Arc<SledStore>) -> Result<RateLimiter> {
        RateLimiter::new(self.config.rate_limit, store, Arc::new(SystemClock::new()))
            .await
            .context("Failed to open rate limiter")
    }
}

fn relocate(config: &mut Config, dir: &Path) {
    config
        .storage
        .path
        .get_or_insert_with(|| dir.join("rate_limits"));
    config
        .moderation
        .blacklist
        .get_or_insert_with(|| dir.join("blacklist.txt"));
    config
        .moderation
        .whitelist
        .get_or_insert_with(|| dir.join("whitelist.txt"));
}
