//! Cache Statistics Module
//!
//! Tracks per-instance counters: hits, misses, reloads and write outcomes.

use serde::Serialize;

// == Cache Stats ==
/// Counters for one cache instance (not shared across processes).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads that found a live entry
    pub hits: u64,
    /// Reads that found nothing, or only an expired entry
    pub misses: u64,
    /// Times the document was re-read because the file changed
    pub reloads: u64,
    /// Mutations persisted to the file
    pub writes: u64,
    /// Mutations discarded because the document would exceed its budget
    pub dropped_writes: u64,
    /// Lock acquisitions that had to wait for another holder
    pub lock_contentions: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_reload(&mut self) {
        self.reloads += 1;
    }

    pub fn record_write(&mut self) {
        self.writes += 1;
    }

    pub fn record_dropped_write(&mut self) {
        self.dropped_writes += 1;
    }

    pub fn record_lock_contention(&mut self) {
        self.lock_contentions += 1;
    }
}
