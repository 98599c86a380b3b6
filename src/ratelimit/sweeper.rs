//! Background eviction of idle clients.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::limiter::RateLimiter;
use crate::task::PeriodicTask;

/// Default time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Recurring task that removes idle clients from a [`RateLimiter`].
///
/// The sweeper runs independently of request traffic. It stops when
/// [`shutdown`](Sweeper::shutdown) is awaited and is aborted if dropped.
#[derive(Debug)]
pub struct Sweeper {
    task: PeriodicTask,
}

impl Sweeper {
    /// Start sweeping `limiter` every `interval`.
    pub fn spawn(limiter: Arc<RateLimiter>, interval: Duration) -> Self {
        let task = PeriodicTask::spawn("sweeper", interval, move || {
            let limiter = limiter.clone();
            async move {
                let evicted = limiter.sweep();
                debug!(
                    evicted = evicted,
                    remaining = limiter.client_count(),
                    "Idle client sweep complete"
                );
            }
        });

        Self { task }
    }

    /// Stop sweeping and wait for the task to exit.
    pub async fn shutdown(self) {
        self.task.shutdown().await;
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}
