//! Cache statistics
//!
//! Counters are updated lock-free from request tasks; [`CacheStats`] is a
//! point-in-time snapshot taken by the store.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters owned by the cache store
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    fills_succeeded: AtomicU64,
    fills_failed: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fill_success(&self) {
        self.fills_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fill_failure(&self) {
        self.fills_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entries: usize, in_flight: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            fills_succeeded: self.fills_succeeded.load(Ordering::Relaxed),
            fills_failed: self.fills_failed.load(Ordering::Relaxed),
            entries,
            in_flight,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests answered from a completed entry
    pub hits: u64,
    /// Requests that started a fill
    pub misses: u64,
    /// Requests that joined a fill already in flight
    pub coalesced: u64,
    /// Fills that registered an entry
    pub fills_succeeded: u64,
    /// Fills that ended without registering
    pub fills_failed: u64,
    /// Completed entries currently held
    pub entries: usize,
    /// Fills currently running
    pub in_flight: usize,
}

impl CacheStats {
    /// Share of lookups served without starting a fill, as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.coalesced;
        if total == 0 {
            return 0.0;
        }
        ((self.hits + self.coalesced) as f64 / total as f64) * 100.0
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entries, {} hits, {} misses, {} coalesced, {} fills ok, {} fills failed ({:.1}% hit rate)",
            self.entries,
            self.hits,
            self.misses,
            self.coalesced,
            self.fills_succeeded,
            self.fills_failed,
            self.hit_rate()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_snapshot() {
        let counters = StatsCounters::default();
        counters.record_miss();
        counters.record_coalesced();
        counters.record_coalesced();
        counters.record_fill_success();
        counters.record_hit();

        let stats = counters.snapshot(1, 0);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.coalesced, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.fills_succeeded, 1);
        assert_eq!(stats.fills_failed, 0);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_hit_rate() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);

        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 75.0).abs() < f64::EPSILON);
        assert!(stats.to_string().contains("75.0% hit rate"));
    }
}
