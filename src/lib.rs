//! Turnstile - In-process admission control
//!
//! This crate implements per-key token-bucket rate limiting. A [`RateLimiter`]
//! owns the per-key bucket state, serializes refill-and-consume steps per key,
//! and delegates the admission decision to a swappable strategy.
//!
//! ```
//! use turnstile::ratelimit::{RateLimitConfig, RateLimiter};
//!
//! let limiter: RateLimiter<&str> = RateLimiter::new();
//! let config = RateLimitConfig::new(5, 2);
//!
//! for _ in 0..5 {
//!     assert!(limiter.admit(&"alice", &config).unwrap());
//! }
//! assert!(!limiter.admit(&"alice", &config).unwrap());
//! ```
//!
//! [`RateLimiter`]: ratelimit::RateLimiter

pub mod config;
pub mod error;
pub mod ratelimit;
