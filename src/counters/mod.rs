//! View/click aggregation keyed by content category and time bucket.

mod export;
mod key;
mod store;

pub use export::{spawn_exporter, CounterExporter, LogExporter, NoopExporter};
pub use key::{Category, CounterKey, TimeBucket, UnknownCategory};
pub use store::{CounterStore, CounterValue, Snapshot};
