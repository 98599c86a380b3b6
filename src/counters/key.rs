//! Counter key derivation: content category plus time bucket.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Rendering of a bucket's start time inside a key.
const BUCKET_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Content category a view is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Sports,
    Entertainment,
    Business,
    Education,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: [Category; 4] = [
        Category::Sports,
        Category::Entertainment,
        Category::Business,
        Category::Education,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Sports => "sports",
            Category::Entertainment => "entertainment",
            Category::Business => "business",
            Category::Education => "education",
        }
    }

    /// Pick a category uniformly at random.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        *Self::ALL.choose(rng).unwrap_or(&Category::Sports)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown category name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// A wall-clock instant truncated to a fixed granularity.
///
/// Buckets are aligned to the Unix epoch, so every instant within the same
/// granule maps to the same bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeBucket {
    /// Epoch seconds at the start of the bucket
    start: i64,
}

impl TimeBucket {
    /// The bucket of width `granularity` that contains `at`.
    pub fn containing(at: DateTime<Utc>, granularity: Duration) -> Self {
        let width = (granularity.as_secs() as i64).max(1);
        let secs = at.timestamp();
        Self {
            start: secs - secs.rem_euclid(width),
        }
    }

    /// Epoch seconds at the start of the bucket.
    pub fn start_secs(&self) -> i64 {
        self.start
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.start, 0)
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.start() {
            Some(start) => write!(f, "{}", start.format(BUCKET_FORMAT)),
            None => write!(f, "{}", self.start),
        }
    }
}

/// Key identifying one aggregate in the counter store.
///
/// Renders as `<category>:<bucket>`, e.g. `sports:2024-01-01 12:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CounterKey {
    pub category: Category,
    pub bucket: TimeBucket,
}

impl CounterKey {
    pub fn new(category: Category, bucket: TimeBucket) -> Self {
        Self { category, bucket }
    }

    /// Key for a view of `category` happening at `at`.
    pub fn at(category: Category, at: DateTime<Utc>, granularity: Duration) -> Self {
        Self::new(category, TimeBucket::containing(at, granularity))
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.bucket)
    }
}

impl Serialize for CounterKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
