//! # Edue Core
//!
//! Core types, configuration, and moderation for Edue Helper.
//!
//! This crate provides:
//! - Configuration loading and validation (JSON5 format, env overrides)
//! - User identity types shared by the limiter and the CLI
//! - Word-list based profanity filtering for chat messages

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod moderation;
pub mod types;

pub use config::{Config, ConfigError, RateLimitConfig};
pub use moderation::{WordFilter, load_wordlist};
pub use types::UserId;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{Config, RateLimitConfig};
    pub use crate::moderation::WordFilter;
    pub use crate::types::*;
}
