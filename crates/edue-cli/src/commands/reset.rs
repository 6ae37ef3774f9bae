//! Administrative reset of a user's limits.

use anyhow::Result;
use edue_core::UserId;

use super::Context;
use crate::ui;

/// Reset command arguments.
#[derive(Debug, Clone)]
pub struct ResetArgs {
    /// User to reset.
    pub user: String,
}

/// Run the reset command.
///
/// # Errors
///
/// Returns error if the stored history cannot be deleted.
pub async fn run_reset(ctx: &Context, args: ResetArgs) -> Result<()> {
    let user = UserId::new(args.user);
    let limiter = ctx.open_limiter(ctx.open_store()?).await?;

    limiter
        .reset_user(&user)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to reset {}: {}", user, e))?;

    ui::success(&format!("Rate limits reset for {user}"));
    Ok(())
}
