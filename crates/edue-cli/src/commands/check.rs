//! Ask the limiter for a decision.

use anyhow::Result;
use edue_core::UserId;
use edue_ratelimit::Decision;

use super::Context;
use crate::ui;

/// Check command arguments.
#[derive(Debug, Clone)]
pub struct CheckArgs {
    /// User to check.
    pub user: String,
    /// Count the request if admitted.
    pub record: bool,
}

/// Run the check command.
///
/// # Errors
///
/// Returns error if the user's history cannot be read.
pub async fn run_check(ctx: &Context, args: CheckArgs) -> Result<()> {
    let user = UserId::new(args.user);
    let limiter = ctx.open_limiter(ctx.open_store()?).await?;

    let decision = if args.record {
        limiter.check_and_record(&user).await?
    } else {
        limiter.check_rate_limit(&user).await?
    };

    match decision {
        Decision::Admitted if args.record => ui::success(&format!("Admitted and recorded for {user}")),
        Decision::Admitted => ui::success(&format!("{user} may make a request")),
        Decision::Rejected(rejection) => {
            ui::warning(&format!("Rejected ({})", rejection.limit));
            ui::info(&rejection.notice());
        }
    }

    Ok(())
}
