//! Per-key bucket state and its exclusion scope.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Mutable runtime state for a single rate-limited key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketState {
    /// Tokens currently available
    pub current_tokens: u64,
    /// When the last refill was applied
    pub last_refill_time: DateTime<Utc>,
}

impl BucketState {
    /// Create a state holding `tokens`, last refilled at `now`.
    pub fn new(tokens: u64, now: DateTime<Utc>) -> Self {
        Self {
            current_tokens: tokens,
            last_refill_time: now,
        }
    }
}

/// A bucket: the [`BucketState`] of one key behind that key's own lock.
///
/// Every read or write of the state goes through this lock, so at most one
/// refill-and-consume step runs per key at a time while other keys proceed
/// independently.
#[derive(Debug)]
pub struct Bucket {
    state: Mutex<BucketState>,
}

impl Bucket {
    /// Create a bucket around an initial state.
    pub fn new(state: BucketState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Run `f` with exclusive access to the state.
    ///
    /// The lock is held only for the duration of `f`.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut BucketState) -> R) -> R {
        let mut state = self.state.lock();
        f(&mut state)
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> BucketState {
        self.state.lock().clone()
    }
}
