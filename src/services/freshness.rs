use chrono::{DateTime, Duration, Utc};

use crate::models::CacheEntry;

/// Source of "now" for staleness decisions
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a single instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Returns true when an entry exists and is younger than `max_age`
///
/// Age is compared in whole days, so an entry 6 days 23 hours old is still
/// fresh under a 7 day threshold.
pub fn is_fresh(entry: Option<&CacheEntry>, max_age: Duration, now: DateTime<Utc>) -> bool {
    match entry {
        Some(entry) => {
            let age = now.signed_duration_since(entry.fetched_at);
            age.num_days() < max_age.num_days()
        }
        None => false,
    }
}

/// How long cached availability stays usable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    max_age: Duration,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::new(Duration::days(7))
    }
}

impl FreshnessPolicy {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn is_fresh(&self, entry: Option<&CacheEntry>, now: DateTime<Utc>) -> bool {
        is_fresh(entry, self.max_age, now)
    }
}
