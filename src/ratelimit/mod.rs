//! Per-client rate limiting and idle-client eviction.

mod bucket;
mod limiter;
mod sweeper;

pub use bucket::{BucketPolicy, ClientBucket};
pub use limiter::RateLimiter;
pub use sweeper::{Sweeper, DEFAULT_SWEEP_INTERVAL};
