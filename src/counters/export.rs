//! Periodic export of aggregated counters.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::store::{CounterStore, Snapshot};
use crate::error::Result;
use crate::task::PeriodicTask;

/// Destination for counter snapshots.
///
/// Exporters receive a copy of the store; a slow or failing exporter never
/// blocks request-path aggregation.
#[async_trait]
pub trait CounterExporter: Send + Sync {
    /// Ship one snapshot.
    async fn export(&self, snapshot: &Snapshot) -> Result<()>;
}

/// Exporter that discards every snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExporter;

#[async_trait]
impl CounterExporter for NoopExporter {
    async fn export(&self, _snapshot: &Snapshot) -> Result<()> {
        Ok(())
    }
}

/// Exporter that writes each aggregate as a structured log event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogExporter;

#[async_trait]
impl CounterExporter for LogExporter {
    async fn export(&self, snapshot: &Snapshot) -> Result<()> {
        for (key, value) in snapshot {
            info!(
                key = %key,
                views = value.views,
                clicks = value.clicks,
                "Counter aggregate"
            );
        }
        Ok(())
    }
}

/// Start exporting `store` to `exporter` every `interval`.
pub fn spawn_exporter(
    store: Arc<CounterStore>,
    exporter: Arc<dyn CounterExporter>,
    interval: Duration,
) -> PeriodicTask {
    PeriodicTask::spawn("exporter", interval, move || {
        let store = store.clone();
        let exporter = exporter.clone();
        async move {
            let snapshot = store.snapshot();
            match exporter.export(&snapshot).await {
                Ok(()) => debug!(keys = snapshot.len(), "Exported counters"),
                Err(e) => warn!(error = %e, keys = snapshot.len(), "Counter export failed"),
            }
        }
    })
}
