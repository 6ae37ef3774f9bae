//! Run text through the profanity filter.

use edue_core::WordFilter;
use edue_core::moderation::MODERATION_NOTICE;

use super::Context;
use crate::ui;

/// Filter command arguments.
#[derive(Debug, Clone)]
pub struct FilterArgs {
    /// Message to check.
    pub text: String,
}

/// Run the filter command.
pub fn run_filter(ctx: &Context, args: &FilterArgs) {
    let filter = WordFilter::from_files(
        &ctx.config.blacklist_path(),
        &ctx.config.whitelist_path(),
    );

    if filter.blocked_len() == 0 {
        ui::warning("Blacklist is empty; nothing will be blocked");
    }

    if filter.is_profane(&args.text) {
        ui::error("Message would be removed");
        ui::info(MODERATION_NOTICE);
    } else {
        ui::success("Message is clean");
    }
}
