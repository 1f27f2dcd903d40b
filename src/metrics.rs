//! Cache statistics: per-shard counters and the aggregated snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-shard performance counters.
///
/// Hit and miss counters are bumped after the shard guard is released, so
/// they are atomics rather than lock-protected cells.
#[derive(Debug, Default)]
pub(crate) struct ShardCounters {
    pub(crate) hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) evictions: AtomicU64,
    pub(crate) overflows: AtomicU64,
}

impl ShardCounters {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn incr_hits(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn incr_misses(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn incr_overflows(&self) {
        self.overflows.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_evictions(&self, n: u64) {
        self.evictions.fetch_add(n, Ordering::Relaxed);
    }
}

/// Point-in-time statistics aggregated across every shard.
///
/// Sizes and counters are summed; used-percent is `100 * size / capacity`,
/// reported as 0 for the MFU tier when its capacity is 0 (LRU-only mode).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Number of active MFU keys.
    pub mfu_size: u64,
    /// Number of active MRU keys.
    pub mru_size: u64,
    /// Total MFU capacity (summed per-shard capacities).
    pub mfu_max_size: u64,
    /// Total MRU capacity (summed per-shard capacities).
    pub mru_max_size: u64,
    /// MFU tier utilization in percent.
    pub mfu_used_pct: u64,
    /// MRU tier utilization in percent.
    pub mru_used_pct: u64,
    /// Cache hits.
    pub hits: u64,
    /// Cache misses.
    pub misses: u64,
    /// Cache evictions (TTL expiries and capacity evictions).
    pub evictions: u64,
    /// Failed sets on full caches (`no_overflow` rejections).
    pub overflows: u64,
}

pub(crate) fn used_percent(size: u64, capacity: u64) -> u64 {
    if capacity == 0 {
        0
    } else {
        size * 100 / capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let counters = ShardCounters::new();
        counters.incr_hits();
        counters.incr_hits();
        counters.incr_misses();
        counters.incr_overflows();
        counters.add_evictions(3);

        assert_eq!(counters.hits.load(Ordering::Relaxed), 2);
        assert_eq!(counters.misses.load(Ordering::Relaxed), 1);
        assert_eq!(counters.overflows.load(Ordering::Relaxed), 1);
        assert_eq!(counters.evictions.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn used_percent_guards_zero_capacity() {
        assert_eq!(used_percent(0, 0), 0);
        assert_eq!(used_percent(5, 0), 0);
        assert_eq!(used_percent(5, 10), 50);
        assert_eq!(used_percent(10, 10), 100);
    }
}
