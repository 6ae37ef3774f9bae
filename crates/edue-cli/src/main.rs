//! Edue CLI - operator tools for the Edue Helper bot.

mod commands;
mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use edue_core::config::{GlobalSettings, LogFormat};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "edue")]
#[command(about = "Edue Helper - rate limit and moderation tools")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.edue/edue.json)
    #[arg(long, global = true, env = "EDUE_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory override
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a user's request counts and remaining quota
    Stats {
        /// User identity (e.g. a Discord user id)
        user: String,

        /// List the stored requests from the last hour
        #[arg(long)]
        history: bool,
    },

    /// Clear all rate-limit history for a user
    Reset {
        /// User identity
        user: String,
    },

    /// Show the effective configuration
    Config {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask the limiter whether a user may make a request now
    Check {
        /// User identity
        user: String,

        /// Count the request if it is admitted
        #[arg(long)]
        record: bool,
    },

    /// Run a message through the profanity filter
    Filter {
        /// Message text
        text: String,
    },
}

fn init_logging(verbose: bool, settings: &GlobalSettings) {
    let filter = if verbose || settings.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match settings.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut ctx = commands::Context::load(cli.config, cli.data_dir)?;

    // Setup logging
    init_logging(cli.verbose, &ctx.config.settings);

    ctx.config.apply_env_overrides()?;
    tracing::debug!(path = %ctx.config_path.display(), "Configuration loaded");

    match cli.command {
        Commands::Stats { user, history } => {
            let args = commands::stats::StatsArgs { user, history };
            commands::run_stats(&ctx, args).await?;
        }

        Commands::Reset { user } => {
            let args = commands::reset::ResetArgs { user };
            commands::run_reset(&ctx, args).await?;
        }

        Commands::Config { json } => {
            let args = commands::config::ConfigArgs { json };
            commands::run_config(&ctx, &args)?;
        }

        Commands::Check { user, record } => {
            let args = commands::check::CheckArgs { user, record };
            commands::run_check(&ctx, args).await?;
        }

        Commands::Filter { text } => {
            let args = commands::filter::FilterArgs { text };
            commands::run_filter(&ctx, &args);
        }
    }

    Ok(())
}
