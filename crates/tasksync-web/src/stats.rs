//! Fanout counters exposed on the health endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct FanoutStats {
    pub published: AtomicU64,
    pub publish_failures: AtomicU64,
    pub relay_forwarded: AtomicU64,
    pub relay_skipped_local: AtomicU64,
    pub relay_skipped_duplicate: AtomicU64,
    pub relay_malformed: AtomicU64,
    pub relay_failures: AtomicU64,
}

/// Point-in-time copy of [`FanoutStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub published: u64,
    pub publish_failures: u64,
    pub relay_forwarded: u64,
    pub relay_skipped_local: u64,
    pub relay_skipped_duplicate: u64,
    pub relay_malformed: u64,
    pub relay_failures: u64,
    pub evictions: u64,
}

impl FanoutStats {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, evictions: u64) -> StatsSnapshot {
        StatsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            relay_forwarded: self.relay_forwarded.load(Ordering::Relaxed),
            relay_skipped_local: self.relay_skipped_local.load(Ordering::Relaxed),
            relay_skipped_duplicate: self.relay_skipped_duplicate.load(Ordering::Relaxed),
            relay_malformed: self.relay_malformed.load(Ordering::Relaxed),
            relay_failures: self.relay_failures.load(Ordering::Relaxed),
            evictions,
        }
    }
}
