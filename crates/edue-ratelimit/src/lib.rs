//! # Edue Rate Limit
//!
//! Per-user request quotas over a trailing minute and a trailing hour.
//!
//! Admitted requests are appended to a durable store so the in-memory
//! windows can be rebuilt after a restart. All state for one user is guarded
//! by that user's own lock; different users never wait on each other.
//!
//! Callers use a two-step protocol: [`RateLimiter::check_rate_limit`] before
//! doing rate-limited work, then [`RateLimiter::record_request`] once they
//! actually perform it. [`RateLimiter::check_and_record`] and
//! [`dispatch::run_limited`] wrap both steps under a single lock hold.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Time sources.
pub mod clock;
mod decision;
/// Two-call protocol helpers for command dispatchers.
pub mod dispatch;
mod error;
mod limiter;
mod registry;
/// Durable request log.
pub mod store;
/// In-memory sliding windows.
pub mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use decision::{Decision, LimitKind, Rejection, UserStats};
pub use dispatch::{DispatchError, GENERIC_FAILURE_NOTICE, Outcome, RecordPolicy, run_limited};
pub use error::RateLimitError;
pub use limiter::RateLimiter;
pub use store::{MemoryStore, RequestRecord, RequestStore, SledStore, StoreError};
pub use window::{HOUR_WINDOW_SECS, MINUTE_WINDOW_SECS, UserWindows};
