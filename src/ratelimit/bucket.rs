//! Per-client token bucket state.

use std::time::{Duration, Instant};

/// Shape of every client's bucket: how large a burst may be and how fast
/// tokens come back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketPolicy {
    /// Maximum tokens a bucket can hold
    pub capacity: f64,
    /// Tokens regenerated per second of elapsed time
    pub refill_per_second: f64,
}

impl BucketPolicy {
    pub fn new(capacity: u32, refill_per_second: f64) -> Self {
        Self {
            capacity: capacity as f64,
            refill_per_second,
        }
    }

    /// Tokens regenerated over `elapsed`.
    fn refill_amount(&self, elapsed: Duration) -> f64 {
        elapsed.as_secs_f64() * self.refill_per_second
    }
}

impl Default for BucketPolicy {
    fn default() -> Self {
        Self::new(3, 1.0)
    }
}

/// Token bucket for a single client.
///
/// Tokens stay within `[0, capacity]`. They are only spent by an admitted
/// request and only regained by time-proportional refill computed on access.
#[derive(Debug, Clone)]
pub struct ClientBucket {
    tokens: f64,
    last_seen: Instant,
}

impl ClientBucket {
    /// Bucket for a client seen for the first time at `now`.
    ///
    /// The request that caused the creation is admitted by construction, so
    /// the bucket starts one token short of full.
    pub fn first_request(policy: &BucketPolicy, now: Instant) -> Self {
        Self {
            tokens: (policy.capacity - 1.0).max(0.0),
            last_seen: now,
        }
    }

    /// Refill for the time since the last access, mark the client as seen,
    /// and spend a token if one is available.
    ///
    /// `last_seen` is refreshed even when the request is denied.
    pub fn try_acquire(&mut self, policy: &BucketPolicy, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_seen);
        self.tokens = (self.tokens + policy.refill_amount(elapsed)).min(policy.capacity);
        if now > self.last_seen {
            self.last_seen = now;
        }

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whether the client has been inactive for longer than `threshold`.
    pub fn is_idle(&self, now: Instant, threshold: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > threshold
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }
}
