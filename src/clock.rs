//! Injectable time source.
//!
//! The rate limiter measures refill and idleness on a monotonic [`Instant`],
//! while counter buckets are labelled with wall-clock UTC time. Both come from
//! the same [`Clock`] so tests can move them forward together.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Monotonic time used for refill and idle calculations.
    fn now(&self) -> Instant;

    /// Wall-clock time used to derive counter time buckets.
    fn wall(&self) -> DateTime<Utc>;
}

/// Clock backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Both readings start at the moment of construction (or at the supplied wall
/// time) and advance by the same amount on [`advance`](ManualClock::advance).
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    wall_origin: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Create a clock whose wall reading starts at `wall`.
    pub fn starting_at(wall: DateTime<Utc>) -> Self {
        Self {
            origin: Instant::now(),
            wall_origin: wall,
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    /// Total time advanced since construction.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }

    fn wall(&self) -> DateTime<Utc> {
        let offset = *self.offset.lock();
        // Offsets beyond chrono's range are not reachable from tests.
        self.wall_origin + chrono::Duration::from_std(offset).unwrap_or(chrono::Duration::zero())
    }
}

/// Shared handle to a clock.
pub type SharedClock = Arc<dyn Clock>;
