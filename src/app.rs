//! Service assembly and lifecycle.

use std::sync::Arc;

use tracing::info;

use crate::clock::SharedClock;
use crate::config::AppConfig;
use crate::counters::{spawn_exporter, CounterExporter, CounterStore};
use crate::http::AppState;
use crate::ratelimit::{RateLimiter, Sweeper};
use crate::task::PeriodicTask;

/// The running service: shared state plus its background tasks.
///
/// Must be started inside a tokio runtime. Background tasks stop on
/// [`shutdown`](App::shutdown) and are aborted if the `App` is dropped.
pub struct App {
    state: AppState,
    sweeper: Sweeper,
    exporter: Option<PeriodicTask>,
}

impl App {
    /// Build the limiter and counter store from `config` and start the
    /// sweeper (and exporter, when an export interval is configured).
    pub fn start(
        config: &AppConfig,
        clock: SharedClock,
        exporter: Arc<dyn CounterExporter>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limiting, clock.clone()));
        let counters = Arc::new(CounterStore::new());

        info!(
            burst_capacity = config.rate_limiting.burst_capacity,
            refill_per_second = config.rate_limiting.refill_per_second,
            idle_threshold_secs = config.rate_limiting.idle_threshold_secs,
            "Rate limiter initialized"
        );

        let sweeper = Sweeper::spawn(limiter.clone(), config.rate_limiting.sweep_interval());

        let exporter = config.counters.export_interval().map(|interval| {
            info!(interval = ?interval, "Counter export enabled");
            spawn_exporter(counters.clone(), exporter, interval)
        });

        let state = AppState::new(limiter, counters, clock, &config.counters);

        Self {
            state,
            sweeper,
            exporter,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Stop background tasks and wait for them to exit.
    pub async fn shutdown(self) {
        self.sweeper.shutdown().await;
        if let Some(exporter) = self.exporter {
            exporter.shutdown().await;
        }
        info!("Background tasks stopped");
    }
}
