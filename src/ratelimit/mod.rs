//! Rate limiting logic and state management.

mod bucket;
mod clock;
mod limiter;
mod policy;
mod rules;
mod strategy;

pub use bucket::{Bucket, BucketState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::RateLimiter;
pub use policy::RateLimitConfig;
pub use rules::PolicyBook;
pub use strategy::{AdmissionStrategy, FixedWindow, StrategyKind, TokenBucket};
