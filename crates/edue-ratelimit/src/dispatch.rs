//! A command dispatcher wraps every rate-limited operation in
//! [`run_limited`]: the check happens first, the work only runs if the user
//! was admitted, and the request is recorded according to [`RecordPolicy`].
//!
//! Rejections come back as [`Outcome::Rejected`] carrying a wait time for
//! the user. Everything else that goes wrong is a [`DispatchError`], which
//! should be logged in full and shown to the user as
//! [`GENERIC_FAILURE_NOTICE`].

use std::fmt;
use std::future::Future;

use edue_core::UserId;
use thiserror::Error;

use crate::decision::{Decision, Rejection};
use crate::error::RateLimitError;
use crate::limiter::RateLimiter;

/// Shown to the user for any failure other than a rejection.
pub const GENERIC_FAILURE_NOTICE: &str = "An unexpected error occurred. Please try again later.";

/// When a rate-limited operation is counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordPolicy {
    /// Count the request atomically with the check, before the work runs.
    #[default]
    BeforeWork,
    /// Count the request only after the work succeeds.
    ///
    /// Failed operations cost nothing, but concurrent calls from one user
    /// may all pass the check while earlier work is still running.
    OnSuccess,
}

/// Result of a rate-limited operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The work ran.
    Completed(T),
    /// The user was over a limit; the work did not run.
    Rejected(Rejection),
}

impl<T> Outcome<T> {
    /// The work's value, if it ran.
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Rejected(_) => None,
        }
    }
}

/// Failure of a rate-limited operation.
#[derive(Error, Debug)]
pub enum DispatchError<E> {
    /// The limiter could not decide.
    #[error(transparent)]
    Limiter(#[from] RateLimitError),

    /// The work itself failed.
    #[error("Operation failed: {0}")]
    Work(E),
}

impl<E> DispatchError<E> {
    /// Message to show the end user.
    #[must_use]
    pub const fn notice(&self) -> &'static str {
        GENERIC_FAILURE_NOTICE
    }
}

/// Run `work` for `user` if the limiter admits it.
///
/// # Errors
///
/// Returns [`DispatchError::Limiter`] if the limiter cannot read the user's
/// history, or [`DispatchError::Work`] if `work` fails.
pub async fn run_limited<T, E, F, Fut>(
    limiter: &RateLimiter,
    user: &UserId,
    policy: RecordPolicy,
    work: F,
) -> Result<Outcome<T>, DispatchError<E>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let decision = match policy {
        RecordPolicy::BeforeWork => limiter.check_and_record(user).await,
        RecordPolicy::OnSuccess => limiter.check_rate_limit(user).await,
    };

    let decision = decision.inspect_err(|e| {
        tracing::error!(user = %user, error = %e, "Rate limit check failed");
    })?;

    if let Decision::Rejected(rejection) = decision {
        return Ok(Outcome::Rejected(rejection));
    }

    match work().await {
        Ok(value) => {
            if policy == RecordPolicy::OnSuccess {
                limiter.record_request(user).await;
            }
            Ok(Outcome::Completed(value))
        }
        Err(e) => {
            tracing::error!(user = %user, error = %e, "Rate-limited operation failed");
            Err(DispatchError::Work(e))
        }
    }
}
