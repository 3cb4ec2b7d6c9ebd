//! Building blocks shared by every content-addressed cache.
//!
//! Each cache stores its objects as [`CacheEntry`] values keyed by the
//! structural parameters that produced them. A per-cache [`GcTimer`] is ticked
//! once per flushed command buffer; entries whose last access is older than the
//! timer's period are evicted by the owning cache's `gc()`.

use std::collections::HashMap;
use std::hash::Hash;

/// Monotonic epoch counter with an "older than the period" predicate.
///
/// The counter starts at the period itself so that nothing inserted during the
/// first period can be considered stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcTimer {
    count: u32,
    period: u32,
}

impl GcTimer {
    /// Create a timer that considers entries stale after `period` ticks.
    pub fn new(period: u32) -> Self {
        Self {
            count: period,
            period,
        }
    }

    /// Advance the epoch by one.
    pub fn tick(&mut self) {
        self.count += 1;
    }

    /// The current epoch, stored into entries on access.
    pub fn current_count(&self) -> u32 {
        self.count
    }

    /// The configured period.
    pub fn period(&self) -> u32 {
        self.period
    }

    /// Whether an entry last touched at `last_accessed` should be evicted.
    pub fn should_recycle(&self, last_accessed: u32) -> bool {
        self.count - self.period > last_accessed
    }
}

/// Hit/miss statistics for one cache, reported when the cache is dropped.
#[derive(Debug)]
pub struct CacheHitCounter {
    name: &'static str,
    hits: u64,
    misses: u64,
}

impl CacheHitCounter {
    /// Create a counter labelled `name` in the report.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            hits: 0,
            misses: 0,
        }
    }

    /// Record a lookup that found an existing entry.
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    /// Record a lookup that had to construct a new entry.
    pub fn miss(&mut self) {
        self.misses += 1;
    }

    /// Number of hits so far.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Number of misses so far.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Hit rate in percent, or `None` if nothing was looked up.
    pub fn hit_rate(&self) -> Option<f64> {
        let total = self.hits + self.misses;
        (total > 0).then(|| self.hits as f64 * 100.0 / total as f64)
    }
}

impl Drop for CacheHitCounter {
    fn drop(&mut self) {
        if let Some(rate) = self.hit_rate() {
            log::info!("{} hit rate: {:.2}%", self.name, rate);
        }
    }
}

/// A cached object together with the epoch it was last accessed in.
#[derive(Debug)]
pub struct CacheEntry<T> {
    pub value: T,
    pub last_accessed: u32,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, epoch: u32) -> Self {
        Self {
            value,
            last_accessed: epoch,
        }
    }

    /// Bump the entry to `epoch` and hand back the value.
    pub fn touch(&mut self, epoch: u32) -> &mut T {
        self.last_accessed = epoch;
        &mut self.value
    }
}

/// Remove every stale entry from `map`, returning the evicted key/value pairs
/// so the caller can release their native objects.
pub(crate) fn drain_stale<K: Hash + Eq, T>(
    map: &mut HashMap<K, CacheEntry<T>>,
    timer: &GcTimer,
) -> Vec<(K, T)> {
    let (stale, fresh): (HashMap<_, _>, HashMap<_, _>) = std::mem::take(map)
        .into_iter()
        .partition(|(_, entry)| timer.should_recycle(entry.last_accessed));
    *map = fresh;
    stale
        .into_iter()
        .map(|(key, entry)| (key, entry.value))
        .collect()
}
