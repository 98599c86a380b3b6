//! Core per-client rate limiter implementation.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::bucket::{BucketPolicy, ClientBucket};
use crate::clock::{SharedClock, SystemClock};
use crate::config::RateLimitingConfig;

/// Default inactivity period after which a client's bucket is dropped.
const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(180);

/// Per-client token bucket rate limiter.
///
/// Each client address owns one [`ClientBucket`]. A bucket is created on the
/// client's first request and removed by [`sweep`](RateLimiter::sweep) once
/// the client has been idle for longer than the idle threshold.
///
/// All work on one client's bucket (refill, spend, `last_seen` refresh) runs
/// under that entry's shard lock, so requests for distinct clients do not
/// serialize on a single global lock.
pub struct RateLimiter {
    /// Bucket state indexed by client address
    clients: DashMap<IpAddr, ClientBucket>,
    policy: BucketPolicy,
    idle_threshold: Duration,
    clock: SharedClock,
}

impl RateLimiter {
    /// Create a rate limiter with the default policy on the system clock.
    pub fn new() -> Self {
        Self::with_clock(
            BucketPolicy::default(),
            DEFAULT_IDLE_THRESHOLD,
            Arc::new(SystemClock),
        )
    }

    /// Create a rate limiter with an explicit policy and time source.
    pub fn with_clock(policy: BucketPolicy, idle_threshold: Duration, clock: SharedClock) -> Self {
        Self {
            clients: DashMap::new(),
            policy,
            idle_threshold,
            clock,
        }
    }

    /// Create a rate limiter from configuration.
    pub fn from_config(config: &RateLimitingConfig, clock: SharedClock) -> Self {
        Self::with_clock(
            BucketPolicy::new(config.burst_capacity, config.refill_per_second),
            config.idle_threshold(),
            clock,
        )
    }

    /// Decide whether a request from `client` may proceed.
    ///
    /// Returns `true` if a token was available and spent. A client seen for
    /// the first time is always admitted.
    pub fn admit(&self, client: IpAddr) -> bool {
        let now = self.clock.now();

        let admitted = match self.clients.entry(client) {
            Entry::Occupied(mut entry) => entry.get_mut().try_acquire(&self.policy, now),
            Entry::Vacant(entry) => {
                debug!(client = %client, capacity = self.policy.capacity, "Tracking new client");
                entry.insert(ClientBucket::first_request(&self.policy, now));
                true
            }
        };

        if admitted {
            trace!(client = %client, "Request admitted");
        } else {
            debug!(client = %client, "Rate limit exceeded");
        }

        admitted
    }

    /// Remove every client idle for longer than the idle threshold.
    ///
    /// Returns the number of clients evicted.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let threshold = self.idle_threshold;
        let mut evicted = 0;

        self.clients.retain(|client, bucket| {
            let idle = bucket.is_idle(now, threshold);
            if idle {
                trace!(client = %client, "Evicting idle client");
                evicted += 1;
            }
            !idle
        });

        evicted
    }

    /// Current token count for a client, if it is tracked.
    pub fn tokens(&self, client: IpAddr) -> Option<f64> {
        self.clients.get(&client).map(|bucket| bucket.tokens())
    }

    /// Whether a client currently has bucket state.
    pub fn is_tracked(&self, client: IpAddr) -> bool {
        self.clients.contains_key(&client)
    }

    /// Get the number of tracked clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn policy(&self) -> BucketPolicy {
        self.policy
    }

    pub fn idle_threshold(&self) -> Duration {
        self.idle_threshold
    }

    /// Forget all clients.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.clients.clear();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::thread;

    fn ip(addr: &str) -> IpAddr {
        addr.parse().unwrap()
    }

    fn test_limiter() -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(
            BucketPolicy::new(3, 1.0),
            Duration::from_secs(180),
            clock.clone(),
        );
        (limiter, clock)
    }

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.client_count(), 0);
        assert_eq!(limiter.policy(), BucketPolicy::new(3, 1.0));
        assert_eq!(limiter.idle_threshold(), Duration::from_secs(180));
    }

    #[test]
    fn test_burst_then_deny() {
        let (limiter, _clock) = test_limiter();
        let client = ip("10.0.0.1");

        assert!(limiter.admit(client));
        assert!(limiter.admit(client));
        assert!(limiter.admit(client));
        assert!(!limiter.admit(client));
        assert_eq!(limiter.tokens(client), Some(0.0));
    }

    #[test]
    fn test_refill_after_one_second() {
        let (limiter, clock) = test_limiter();
        let client = ip("10.0.0.1");

        for _ in 0..3 {
            assert!(limiter.admit(client));
        }
        assert!(!limiter.admit(client));

        clock.advance(Duration::from_secs(1));
        assert!(limiter.admit(client));
        assert!(!limiter.admit(client));
    }

    #[test]
    fn test_refill_caps_at_capacity() {
        let (limiter, clock) = test_limiter();
        let client = ip("10.0.0.1");

        limiter.admit(client);
        clock.advance(Duration::from_secs(60));

        for _ in 0..3 {
            assert!(limiter.admit(client));
        }
        assert!(!limiter.admit(client));
    }

    #[test]
    fn test_different_clients_have_separate_buckets() {
        let (limiter, _clock) = test_limiter();
        let a = ip("10.0.0.1");
        let b = ip("10.0.0.2");

        for _ in 0..3 {
            assert!(limiter.admit(a));
        }
        assert!(!limiter.admit(a));

        assert!(limiter.admit(b));
        assert_eq!(limiter.client_count(), 2);
    }

    #[test]
    fn test_sweep_evicts_only_idle_clients() {
        let (limiter, clock) = test_limiter();
        let idle = ip("10.0.0.1");
        let active = ip("10.0.0.2");

        limiter.admit(idle);
        clock.advance(Duration::from_secs(120));
        limiter.admit(active);
        clock.advance(Duration::from_secs(61));

        assert_eq!(limiter.sweep(), 1);
        assert!(!limiter.is_tracked(idle));
        assert!(limiter.is_tracked(active));
    }

    #[test]
    fn test_denied_probing_keeps_client_alive() {
        let (limiter, clock) = test_limiter();
        let client = ip("10.0.0.1");

        for _ in 0..3 {
            limiter.admit(client);
        }

        // Keep probing every 100 seconds; denied or not, the client stays active
        for _ in 0..5 {
            clock.advance(Duration::from_secs(100));
            limiter.admit(client);
            assert_eq!(limiter.sweep(), 0);
        }
        assert!(limiter.is_tracked(client));
    }

    #[test]
    fn test_evicted_client_starts_fresh() {
        let (limiter, clock) = test_limiter();
        let client = ip("10.0.0.1");

        for _ in 0..3 {
            limiter.admit(client);
        }
        assert!(!limiter.admit(client));

        clock.advance(Duration::from_secs(181));
        limiter.sweep();
        assert!(!limiter.is_tracked(client));

        assert!(limiter.admit(client));
        assert_eq!(limiter.tokens(client), Some(2.0));
    }

    #[test]
    fn test_concurrent_first_requests_create_one_bucket() {
        let (limiter, _clock) = test_limiter();
        let limiter = Arc::new(limiter);
        let client = ip("10.0.0.9");

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = limiter.clone();
                thread::spawn(move || limiter.admit(client))
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|admitted| *admitted)
            .count();

        // Time is frozen, so exactly the burst capacity gets through
        assert_eq!(admitted, 3);
        assert_eq!(limiter.client_count(), 1);
        assert_eq!(limiter.tokens(client), Some(0.0));
    }

    #[test]
    fn test_concurrent_sweep_and_admit_do_not_tear() {
        let (limiter, clock) = test_limiter();
        let limiter = Arc::new(limiter);
        let clients: Vec<IpAddr> = (1..=50).map(|i| ip(&format!("10.1.0.{}", i))).collect();

        for client in &clients {
            limiter.admit(*client);
        }
        clock.advance(Duration::from_secs(181));

        let sweeper = {
            let limiter = limiter.clone();
            thread::spawn(move || limiter.sweep())
        };
        let admitters: Vec<_> = clients
            .iter()
            .copied()
            .map(|client| {
                let limiter = limiter.clone();
                thread::spawn(move || limiter.admit(client))
            })
            .collect();

        sweeper.join().unwrap();
        for handle in admitters {
            // Either the old bucket refilled to capacity or a fresh one was made
            assert!(handle.join().unwrap());
        }

        for client in &clients {
            let tokens = limiter.tokens(*client).unwrap();
            assert_eq!(tokens, 2.0);
        }
    }

    #[test]
    fn test_clear_clients() {
        let (limiter, _clock) = test_limiter();
        limiter.admit(ip("10.0.0.1"));
        assert_eq!(limiter.client_count(), 1);

        limiter.clear();
        assert_eq!(limiter.client_count(), 0);
    }
}
