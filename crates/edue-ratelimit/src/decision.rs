//! Limiter results.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which threshold rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    /// Trailing 60 seconds.
    PerMinute,
    /// Trailing 3600 seconds.
    PerHour,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerMinute => write!(f, "per minute"),
            Self::PerHour => write!(f, "per hour"),
        }
    }
}

/// A rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    /// Seconds until the request would have been admitted.
    pub retry_after_secs: f64,
    /// Threshold that was hit.
    pub limit: LimitKind,
}

impl Rejection {
    /// Retry delay as a `Duration`.
    #[must_use]
    pub fn retry_after(&self) -> Duration {
        Duration::try_from_secs_f64(self.retry_after_secs).unwrap_or(Duration::ZERO)
    }

    /// Human-readable wait message for the end user.
    #[must_use]
    pub fn notice(&self) -> String {
        format!(
            "You've exceeded the rate limit ({}). Please wait {:.1} seconds before trying again.",
            self.limit, self.retry_after_secs
        )
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rate limit exceeded ({}). Try again in {:.1} seconds.",
            self.limit, self.retry_after_secs
        )
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// The request fits in both windows.
    Admitted,
    /// The request would exceed a threshold.
    Rejected(Rejection),
}

impl Decision {
    /// Whether the request was admitted.
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }

    /// The rejection, if any.
    #[must_use]
    pub const fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Admitted => None,
            Self::Rejected(r) => Some(r),
        }
    }
}

/// Current usage for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    /// Requests in the trailing minute.
    pub minute_count: u32,
    /// Per-minute threshold.
    pub minute_limit: u32,
    /// Requests in the trailing hour.
    pub hour_count: u32,
    /// Per-hour threshold.
    pub hour_limit: u32,
}

impl UserStats {
    /// Requests left in the minute window.
    #[must_use]
    pub const fn minute_remaining(&self) -> u32 {
        self.minute_limit.saturating_sub(self.minute_count)
    }

    /// Requests left in the hour window.
    #[must_use]
    pub const fn hour_remaining(&self) -> u32 {
        self.hour_limit.saturating_sub(self.hour_count)
    }
}
