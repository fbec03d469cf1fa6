//! Admission strategies.
//!
//! A strategy decides whether a single request for a key is admitted. It is
//! stateless: the per-key [`BucketState`] is owned by the limiter and handed
//! in under that key's lock, so swapping strategies never changes where
//! state lives.

use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::bucket::BucketState;
use super::policy::RateLimitConfig;

/// Trait for admission decision algorithms.
pub trait AdmissionStrategy: Send + Sync + Debug {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Decide whether to admit one request.
    ///
    /// Called with the key's lock held. Returns `true` if the request was
    /// admitted.
    fn decide(&self, config: &RateLimitConfig, state: &mut BucketState, now: DateTime<Utc>) -> bool;
}

/// Lazily refilled token bucket.
///
/// Tokens are credited only for whole elapsed minutes. When no whole minute
/// has passed, `last_refill_time` is left alone so partial progress toward
/// the next minute carries over.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenBucket;

impl TokenBucket {
    /// Apply any refill that is due at `now`.
    pub fn refill(config: &RateLimitConfig, state: &mut BucketState, now: DateTime<Utc>) {
        // A smaller capacity may be supplied for an existing key.
        state.current_tokens = state.current_tokens.min(config.capacity);

        let elapsed_minutes = (now - state.last_refill_time).num_minutes();
        if elapsed_minutes <= 0 {
            return;
        }

        let tokens_to_add = config
            .refill_rate_per_minute
            .saturating_mul(elapsed_minutes as u64);
        state.current_tokens = state
            .current_tokens
            .saturating_add(tokens_to_add)
            .min(config.capacity);
        state.last_refill_time = now;
    }
}

impl AdmissionStrategy for TokenBucket {
    fn name(&self) -> &'static str {
        "token_bucket"
    }

    fn decide(&self, config: &RateLimitConfig, state: &mut BucketState, now: DateTime<Utc>) -> bool {
        Self::refill(config, state, now);

        if state.current_tokens > 0 {
            state.current_tokens -= 1;
            true
        } else {
            false
        }
    }
}

/// Pass-through placeholder for fixed-window limiting.
///
/// Admits every request and leaves the bucket untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedWindow;

impl AdmissionStrategy for FixedWindow {
    fn name(&self) -> &'static str {
        "fixed_window"
    }

    fn decide(&self, _config: &RateLimitConfig, _state: &mut BucketState, _now: DateTime<Utc>) -> bool {
        true
    }
}

/// Selectable strategy names, as they appear in settings and on the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    TokenBucket,
    FixedWindow,
}

impl StrategyKind {
    /// Instantiate the strategy.
    pub fn build(self) -> Arc<dyn AdmissionStrategy> {
        match self {
            StrategyKind::TokenBucket => Arc::new(TokenBucket),
            StrategyKind::FixedWindow => Arc::new(FixedWindow),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn start() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_token_bucket_consumes_until_empty() {
        let config = RateLimitConfig::new(5, 2);
        let mut state = BucketState::new(5, start());

        for expected in (0..5).rev() {
            assert!(TokenBucket.decide(&config, &mut state, start()));
            assert_eq!(state.current_tokens, expected);
        }

        assert!(!TokenBucket.decide(&config, &mut state, start()));
        assert_eq!(state.current_tokens, 0);
    }

    #[test]
    fn test_token_bucket_refills_whole_minutes() {
        let config = RateLimitConfig::new(5, 2);
        let mut state = BucketState::new(0, start());
        let now = start() + Duration::minutes(1);

        assert!(TokenBucket.decide(&config, &mut state, now));
        assert_eq!(state.current_tokens, 1);
        assert_eq!(state.last_refill_time, now);
    }

    #[test]
    fn test_token_bucket_refill_capped_at_capacity() {
        let config = RateLimitConfig::new(5, 2);
        let mut state = BucketState::new(0, start());

        assert!(TokenBucket.decide(&config, &mut state, start() + Duration::minutes(10)));
        assert_eq!(state.current_tokens, 4);
    }

    #[test]
    fn test_token_bucket_partial_minute_keeps_refill_time() {
        let config = RateLimitConfig::new(5, 2);
        let mut state = BucketState::new(0, start());

        assert!(!TokenBucket.decide(&config, &mut state, start() + Duration::seconds(59)));
        assert_eq!(state.last_refill_time, start());

        // 59s + 30s crosses the first whole minute since the original refill time
        assert!(TokenBucket.decide(&config, &mut state, start() + Duration::seconds(89)));
        assert_eq!(state.current_tokens, 1);
    }

    #[test]
    fn test_token_bucket_multiplies_elapsed_minutes() {
        let config = RateLimitConfig::new(100, 3);
        let mut state = BucketState::new(10, start());

        TokenBucket::refill(&config, &mut state, start() + Duration::seconds(4 * 60 + 30));
        assert_eq!(state.current_tokens, 22);
    }

    #[test]
    fn test_token_bucket_ignores_clock_going_backwards() {
        let config = RateLimitConfig::new(5, 2);
        let mut state = BucketState::new(1, start());

        TokenBucket::refill(&config, &mut state, start() - Duration::minutes(5));
        assert_eq!(state, BucketState::new(1, start()));
    }

    #[test]
    fn test_token_bucket_clamps_to_smaller_capacity() {
        let mut state = BucketState::new(10, start());

        assert!(TokenBucket.decide(&RateLimitConfig::new(3, 1), &mut state, start()));
        assert_eq!(state.current_tokens, 2);
    }

    #[test]
    fn test_fixed_window_always_admits_without_mutation() {
        let config = RateLimitConfig::new(1, 1);
        let mut state = BucketState::new(0, start());

        for _ in 0..10 {
            assert!(FixedWindow.decide(&config, &mut state, start() + Duration::minutes(5)));
        }
        assert_eq!(state, BucketState::new(0, start()));
    }

    #[test]
    fn test_strategy_kind_build() {
        assert_eq!(StrategyKind::TokenBucket.build().name(), "token_bucket");
        assert_eq!(StrategyKind::FixedWindow.build().name(), "fixed_window");
        assert_eq!(StrategyKind::default(), StrategyKind::TokenBucket);
    }

    #[test]
    fn test_strategy_kind_deserialize() {
        let kind: StrategyKind = serde_yaml::from_str("fixed_window").unwrap();
        assert_eq!(kind, StrategyKind::FixedWindow);
    }
}
