//! Core rate limiter implementation.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, trace};

use super::bucket::{Bucket, BucketState};
use super::clock::{Clock, SystemClock};
use super::policy::RateLimitConfig;
use super::strategy::{AdmissionStrategy, TokenBucket};
use crate::error::Result;

/// The core rate limiter that owns per-key bucket state.
///
/// This struct is thread-safe and is meant to be shared (e.g. behind an
/// `Arc`) by every caller that needs admission control. Buckets live in a
/// sharded concurrent map, so creating a bucket for a new key does not stall
/// requests for existing keys, and each bucket carries its own lock.
pub struct RateLimiter<K, C = SystemClock> {
    /// Buckets indexed by caller key
    buckets: DashMap<K, Arc<Bucket>>,
    /// The active admission strategy
    strategy: RwLock<Arc<dyn AdmissionStrategy>>,
    /// Time source for refill calculations
    clock: C,
}

impl<K> RateLimiter<K, SystemClock>
where
    K: Eq + Hash + Clone + Debug,
{
    /// Create a new token-bucket rate limiter driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl<K> Default for RateLimiter<K, SystemClock>
where
    K: Eq + Hash + Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, C> RateLimiter<K, C>
where
    K: Eq + Hash + Clone + Debug,
    C: Clock,
{
    /// Create a new token-bucket rate limiter using `clock`.
    pub fn with_clock(clock: C) -> Self {
        Self {
            buckets: DashMap::new(),
            strategy: RwLock::new(Arc::new(TokenBucket)),
            clock,
        }
    }

    /// Use `strategy` instead of the default token bucket.
    pub fn with_strategy(self, strategy: Arc<dyn AdmissionStrategy>) -> Self {
        *self.strategy.write() = strategy;
        self
    }

    /// Decide whether a request for `key` is admitted under `config`.
    ///
    /// Returns `Ok(true)` if a token was consumed and `Ok(false)` if the
    /// request was rejected. Fails with
    /// [`TurnstileError::InvalidConfiguration`](crate::error::TurnstileError::InvalidConfiguration)
    /// before any state is created when `config` has a zero capacity or
    /// refill rate.
    pub fn admit(&self, key: &K, config: &RateLimitConfig) -> Result<bool> {
        config.validate()?;

        // Captured once so the whole decision runs against a single strategy.
        let strategy = self.strategy.read().clone();
        let bucket = self.bucket(key, config);

        trace!(
            key = ?key,
            strategy = strategy.name(),
            "Checking rate limit"
        );

        let (admitted, remaining) = bucket.with_state(|state| {
            let admitted = strategy.decide(config, state, self.clock.now());
            (admitted, state.current_tokens)
        });

        if !admitted {
            debug!(
                key = ?key,
                capacity = config.capacity,
                "Rate limit exceeded"
            );
        } else {
            trace!(key = ?key, remaining = remaining, "Request admitted");
        }

        Ok(admitted)
    }

    /// Replace the admission strategy for all subsequent calls.
    ///
    /// Calls already in progress finish with the strategy they started with.
    pub fn set_strategy(&self, strategy: Arc<dyn AdmissionStrategy>) {
        let mut current = self.strategy.write();
        debug!(
            from = current.name(),
            to = strategy.name(),
            "Switching admission strategy"
        );
        *current = strategy;
    }

    /// Name of the active strategy.
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.read().name()
    }

    /// Get the current token count for a key.
    ///
    /// Returns `None` if no bucket exists for the key. No refill is applied.
    pub fn tokens(&self, key: &K) -> Option<u64> {
        self.snapshot(key).map(|state| state.current_tokens)
    }

    /// Copy of the bucket state for a key, if one exists.
    pub fn snapshot(&self, key: &K) -> Option<BucketState> {
        let bucket = self.buckets.get(key).map(|entry| Arc::clone(entry.value()))?;
        Some(bucket.snapshot())
    }

    /// Drop the bucket for a key. The next request starts a fresh bucket.
    ///
    /// A bucket that an in-flight request still holds is kept, so a key
    /// never has two live buckets. Returns `true` if the bucket was dropped.
    pub fn remove(&self, key: &K) -> bool {
        self.buckets
            .remove_if(key, |_, bucket| Arc::strong_count(bucket) == 1)
            .is_some()
    }

    /// Clear all buckets not held by an in-flight request.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.buckets
            .retain(|_, bucket| Arc::strong_count(bucket) > 1);
    }

    /// Get the number of tracked keys.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Get or create the bucket for a key.
    ///
    /// Concurrent callers racing on a new key all end up with the same
    /// bucket. The map shard is released before the bucket is returned.
    fn bucket(&self, key: &K, config: &RateLimitConfig) -> Arc<Bucket> {
        if let Some(existing) = self.buckets.get(key) {
            return Arc::clone(existing.value());
        }

        let entry = self.buckets.entry(key.clone()).or_insert_with(|| {
            let tokens = config.starting_tokens();
            debug!(
                key = ?key,
                capacity = config.capacity,
                refill_rate_per_minute = config.refill_rate_per_minute,
                tokens = tokens,
                "Creating new bucket"
            );
            Arc::new(Bucket::new(BucketState::new(tokens, self.clock.now())))
        });
        Arc::clone(entry.value())
    }
}
