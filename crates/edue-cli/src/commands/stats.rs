//! Per-user usage report.

use std::sync::Arc;

use anyhow::Result;
use edue_core::UserId;
use edue_ratelimit::store::to_datetime;
use edue_ratelimit::{Clock, HOUR_WINDOW_SECS, RequestStore, SystemClock};

use super::Context;
use crate::ui;

/// Stats command arguments.
#[derive(Debug, Clone)]
pub struct StatsArgs {
    /// User to report on.
    pub user: String,
    /// Also list stored request times.
    pub history: bool,
}

/// Run the stats command.
///
/// # Errors
///
/// Returns error if the store cannot be opened or read.
pub async fn run_stats(ctx: &Context, args: StatsArgs) -> Result<()> {
    let user = UserId::new(args.user);
    let store = ctx.open_store()?;
    let limiter = ctx.open_limiter(Arc::clone(&store)).await?;
    let clock = SystemClock::new();

    let stats = limiter.get_user_stats(&user).await?;

    ui::header(&format!("Rate limits for {user}"));
    ui::quota("Per minute", stats.minute_count, stats.minute_limit);
    ui::quota("Per hour", stats.hour_count, stats.hour_limit);

    if stats.minute_remaining() == 0 || stats.hour_remaining() == 0 {
        ui::warning("User is currently rate limited");
    }

    if args.history {
        let times = store.load_since(&user, clock.now() - HOUR_WINDOW_SECS).await?;
        println!();
        if times.is_empty() {
            ui::info("No requests in the last hour.");
            return Ok(());
        }

        println!("{:<28} {:>10}", "REQUESTED AT (UTC)", "AGE (s)");
        println!("{}", "-".repeat(39));
        let now = clock.now();
        for time in times {
            let when = to_datetime(time).map_or_else(
                || format!("{time:.3}"),
                |dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            );
            println!("{:<28} {:>10.1}", when, now - time);
        }
    }

    Ok(())
}
