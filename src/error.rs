//! Error types for Turnstile.

use thiserror::Error;

/// Main error type for Turnstile operations.
///
/// A rejected request is not an error: [`crate::ratelimit::RateLimiter::admit`]
/// reports it as `Ok(false)`.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// A rate limit policy with a zero capacity or refill rate
    #[error("Invalid configuration: capacity={capacity}, refill_rate_per_minute={refill_rate_per_minute} (both must be greater than 0)")]
    InvalidConfiguration {
        capacity: u64,
        refill_rate_per_minute: u64,
    },

    /// Settings or policy file errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A policy name that is not defined
    #[error("Unknown policy: {0}")]
    UnknownPolicy(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
