//! Rate limiter errors.

use thiserror::Error;

use crate::store::StoreError;

/// Rate limiter errors.
///
/// Only read-path failures surface here; failed writes of admitted requests
/// are logged and absorbed.
#[derive(Error, Debug)]
pub enum RateLimitError {
    /// The request log could not be read or reset.
    #[error("Rate limit store error: {0}")]
    Store(#[from] StoreError),

    /// Thresholds must both be positive.
    #[error("Invalid rate limits: {0}")]
    InvalidLimits(String),
}
