//! Show the effective configuration.

use anyhow::Result;
use edue_core::config::LogFormat;

use super::Context;
use crate::ui;

/// Config command arguments.
#[derive(Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Print the configuration as JSON.
    pub json: bool,
}

/// Run the config command.
///
/// # Errors
///
/// Returns error if the configuration cannot be serialized.
pub fn run_config(ctx: &Context, args: &ConfigArgs) -> Result<()> {
    let config = &ctx.config;

    if args.json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    ui::header("Edue configuration");

    let source = if ctx.config_path.exists() {
        ctx.config_path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", ctx.config_path.display())
    };
    ui::kv("Config file", &source);

    ui::kv("Per minute", &config.rate_limit.per_minute.to_string());
    ui::kv("Per hour", &config.rate_limit.per_hour.to_string());
    ui::kv("Storage", &config.storage_path().display().to_string());
    ui::kv("Blacklist", &config.blacklist_path().display().to_string());
    ui::kv("Whitelist", &config.whitelist_path().display().to_string());

    let format = match config.settings.log_format {
        LogFormat::Pretty => "pretty",
        LogFormat::Json => "json",
    };
    ui::kv("Log format", format);
    ui::kv("Debug", &config.settings.debug.to_string());

    Ok(())
}
