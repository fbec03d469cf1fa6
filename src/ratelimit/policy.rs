//! Rate limit policy definition.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TurnstileError};

/// Immutable rate limit policy for one or more keys.
///
/// A single policy may be shared by reference across any number of keys and
/// callers; it is never mutated by the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum number of tokens a bucket can hold
    pub capacity: u64,
    /// Tokens added per whole elapsed minute
    pub refill_rate_per_minute: u64,
    /// Tokens a new bucket starts with (defaults to `capacity`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_tokens: Option<u64>,
}

impl RateLimitConfig {
    /// Create a policy whose buckets start full.
    pub fn new(capacity: u64, refill_rate_per_minute: u64) -> Self {
        Self {
            capacity,
            refill_rate_per_minute,
            initial_tokens: None,
        }
    }

    /// Start new buckets with `tokens` instead of a full bucket.
    pub fn with_initial_tokens(mut self, tokens: u64) -> Self {
        self.initial_tokens = Some(tokens);
        self
    }

    /// Check that capacity and refill rate are both non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 || self.refill_rate_per_minute == 0 {
            return Err(TurnstileError::InvalidConfiguration {
                capacity: self.capacity,
                refill_rate_per_minute: self.refill_rate_per_minute,
            });
        }
        Ok(())
    }

    /// Token count for a freshly created bucket, never above capacity.
    pub fn starting_tokens(&self) -> u64 {
        self.initial_tokens
            .unwrap_or(self.capacity)
            .min(self.capacity)
    }
}
