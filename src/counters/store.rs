//! Concurrent view/click aggregation.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, trace};

use super::key::CounterKey;

/// View and click totals for one key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterValue {
    pub views: u64,
    pub clicks: u64,
}

/// Point-in-time copy of every aggregate, ordered by key.
pub type Snapshot = BTreeMap<CounterKey, CounterValue>;

/// Atomic counters for a single key.
#[derive(Debug, Default)]
struct CounterCell {
    views: AtomicU64,
    clicks: AtomicU64,
}

impl CounterCell {
    fn record_view(&self) -> CounterValue {
        let views = self.views.fetch_add(1, Ordering::AcqRel) + 1;
        CounterValue {
            views,
            clicks: self.clicks.load(Ordering::Acquire),
        }
    }

    fn record_click(&self) {
        self.clicks.fetch_add(1, Ordering::AcqRel);
    }

    fn load(&self) -> CounterValue {
        CounterValue {
            views: self.views.load(Ordering::Acquire),
            clicks: self.clicks.load(Ordering::Acquire),
        }
    }
}

/// Concurrent store of view/click counts keyed by category and time bucket.
///
/// Entries are created on the first view of a key and never removed.
/// Increments are single atomic operations on the entry's counters, so
/// concurrent writers never lose updates, and writers on distinct keys only
/// share a shard read lock.
#[derive(Debug, Default)]
pub struct CounterStore {
    entries: DashMap<CounterKey, CounterCell>,
}

impl CounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a view for `key`, creating the entry on first sight.
    ///
    /// Returns the entry's totals as observed right after this view.
    pub fn record_view(&self, key: CounterKey) -> CounterValue {
        if let Some(cell) = self.entries.get(&key) {
            let value = cell.record_view();
            trace!(key = %key, views = value.views, "Recorded view");
            return value;
        }

        match self.entries.entry(key) {
            Entry::Occupied(entry) => entry.get().record_view(),
            Entry::Vacant(entry) => {
                debug!(key = %key, "Creating counter entry");
                let cell = CounterCell::default();
                let value = cell.record_view();
                entry.insert(cell);
                value
            }
        }
    }

    /// Count a click for `key`.
    ///
    /// Clicks are only attributed to keys that already have a view; for an
    /// unknown key this is a no-op and returns `false`.
    pub fn record_click(&self, key: &CounterKey) -> bool {
        match self.entries.get(key) {
            Some(cell) => {
                cell.record_click();
                trace!(key = %key, "Recorded click");
                true
            }
            None => {
                debug!(key = %key, "Ignoring click for unknown key");
                false
            }
        }
    }

    /// Current totals for `key`.
    pub fn get(&self, key: &CounterKey) -> Option<CounterValue> {
        self.entries.get(key).map(|cell| cell.load())
    }

    /// Copy every entry.
    ///
    /// Each count is a value some writer actually produced; no consistency
    /// across keys is implied.
    pub fn snapshot(&self) -> Snapshot {
        self.entries
            .iter()
            .map(|entry| (*entry.key(), entry.value().load()))
            .collect()
    }

    /// Get the number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
