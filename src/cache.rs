//! The sharded two-tier cache.
//!
//! [`TierCache`] routes every operation to exactly one shard by hashing
//! the key and masking with the (power-of-two) shard count. Each
//! shard runs under its own reader-writer lock, so operations on
//! different shards never contend and concurrent gets on the same shard
//! share the lock.
//!
//! ## Example
//!
//! ```
//! use tiercache::cache::TierCache;
//! use tiercache::config::Config;
//!
//! let cache: TierCache<String, String> = TierCache::new(Config {
//!     mfu_size: 32,
//!     mru_size: 128,
//!     shard_count: 4,
//!     ..Config::default()
//! })
//! .unwrap();
//!
//! cache.set("user:1".to_string(), "alice".to_string());
//! assert_eq!(cache.get(&"user:1".to_string()), Some("alice".to_string()));
//!
//! let stats = cache.stats();
//! assert_eq!(stats.hits, 1);
//! ```

use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::{Config, DEFAULT_SHARD_COUNT};
use crate::ds::router::ShardRouter;
use crate::error::TierCacheError;
use crate::maintenance::Sweeper;
use crate::metrics::{Stats, used_percent};
use crate::shard::{Shard, Tier};

/// Diagnostic entry returned by [`TierCache::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo<K> {
    /// The cached key.
    pub key: K,
    /// The tier the key currently lives in.
    pub tier: Tier,
    /// The key's read count.
    pub score: u64,
}

/// Shared cache state: the shard array plus the flags the background
/// sweeper observes.
pub(crate) struct Core<K, V> {
    pub(crate) shards: Box<[Shard<K, V>]>,
    pub(crate) paused: AtomicBool,
    pub(crate) evict_log: bool,
    router: ShardRouter,
    auto_evict: bool,
    mru_capacity: usize,
    mfu_capacity: usize,
}

/// Sharded two-tier (MFU/MRU) key/value cache with optional per-key TTL.
///
/// New keys are admitted to the MRU tier; keys that accumulate reads are
/// promoted to the MFU tier by the maintenance pass, which shelters them
/// from large scans flowing through the MRU. See the crate docs for the
/// full replacement policy.
pub struct TierCache<K, V> {
    core: Arc<Core<K, V>>,
    sweeper: Option<Sweeper>,
}

impl<K, V> TierCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Builds a cache from `config`.
    ///
    /// Validates that `shard_count` is a power of two (0 selects the
    /// default of 512) and that `mru_size` is at least 1. Each shard
    /// receives `ceil(size / shard_count)` slots per tier. When
    /// `auto_evict_interval` is non-zero a background sweeper thread is
    /// spawned, cancellable through `config.shutdown_signal`; otherwise
    /// promotion/eviction runs inline on every set.
    pub fn new(config: Config) -> Result<Self, TierCacheError> {
        if config.shard_count != 0 && !config.shard_count.is_power_of_two() {
            return Err(TierCacheError::ShardCountNotPowerOfTwo(config.shard_count));
        }
        if config.mru_size == 0 {
            return Err(TierCacheError::ZeroMruCapacity);
        }

        let shard_count = if config.shard_count == 0 {
            DEFAULT_SHARD_COUNT
        } else {
            config.shard_count
        };

        let mru_cap = config.mru_size.div_ceil(shard_count);
        let mfu_cap = config.mfu_size.div_ceil(shard_count);

        let shards: Box<[Shard<K, V>]> = (0..shard_count)
            .map(|_| Shard::new(mru_cap, mfu_cap, config.no_overflow))
            .collect();

        let core = Arc::new(Core {
            shards,
            paused: AtomicBool::new(false),
            evict_log: config.evict_log,
            router: ShardRouter::new(shard_count),
            auto_evict: config.auto_evict_interval > 0,
            mru_capacity: mru_cap * shard_count,
            mfu_capacity: mfu_cap * shard_count,
        });

        let sweeper = if config.auto_evict_interval > 0 {
            Some(Sweeper::spawn(
                Arc::clone(&core),
                Duration::from_millis(config.auto_evict_interval),
                config.shutdown_signal.unwrap_or_default(),
            ))
        } else {
            None
        };

        Ok(Self { core, sweeper })
    }

    fn shard(&self, key: &K) -> &Shard<K, V> {
        &self.core.shards[self.core.router.route(key)]
    }

    /// Looks up a key. Hits bump the key's score; misses are counted.
    pub fn get(&self, key: &K) -> Option<V> {
        self.shard(key).get(key)
    }

    /// Inserts or updates a key in the MRU tier.
    ///
    /// Returns `false` only when `no_overflow` is configured and the
    /// owning shard's MRU is full; the rejection is counted in
    /// [`Stats::overflows`].
    pub fn set(&self, key: K, value: V) -> bool {
        let shard = self.shard(&key);
        let ok = shard.set(key, value);
        if ok && !self.core.auto_evict {
            shard.promote_evict();
        }
        ok
    }

    /// As [`set`](Self::set), additionally expiring the key `ttl` from now.
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) -> bool {
        let shard = self.shard(&key);
        let ok = shard.set_with_ttl(key, value, ttl);
        if ok && !self.core.auto_evict {
            shard.promote_evict();
        }
        ok
    }

    /// Deletes a key. Missing keys are a silent no-op.
    pub fn remove(&self, key: &K) {
        self.shard(key).remove(key);
    }

    /// Drops every MRU entry across all shards.
    pub fn flush_mru(&self) {
        for shard in self.core.shards.iter() {
            shard.flush_mru();
        }
    }

    /// Drops every MFU entry across all shards.
    pub fn flush_mfu(&self) {
        for shard in self.core.shards.iter() {
            shard.flush_mfu();
        }
    }

    /// Drops every entry across all shards.
    pub fn flush_all(&self) {
        for shard in self.core.shards.iter() {
            shard.flush_all();
        }
    }

    /// Returns up to `n` resident keys with their tier and score, sorted
    /// by score in descending order.
    ///
    /// Diagnostic: walks every shard under a shared guard.
    pub fn list(&self, n: usize) -> Vec<KeyInfo<K>> {
        let mut out = Vec::new();
        for shard in self.core.shards.iter() {
            shard.snapshot_keys(&mut out);
        }
        out.sort_by(|a, b| b.score.cmp(&a.score));
        out.truncate(n);
        out
    }

    /// Returns statistics aggregated across every shard.
    pub fn stats(&self) -> Stats {
        let mut stats = Stats {
            mru_max_size: self.core.mru_capacity as u64,
            mfu_max_size: self.core.mfu_capacity as u64,
            ..Stats::default()
        };

        for shard in self.core.shards.iter() {
            stats.mru_size += shard.mru_len() as u64;
            stats.mfu_size += shard.mfu_len() as u64;

            let counters = shard.counters();
            stats.hits += counters.hits.load(Ordering::Relaxed);
            stats.misses += counters.misses.load(Ordering::Relaxed);
            stats.evictions += counters.evictions.load(Ordering::Relaxed);
            stats.overflows += counters.overflows.load(Ordering::Relaxed);
        }

        stats.mru_used_pct = used_percent(stats.mru_size, stats.mru_max_size);
        stats.mfu_used_pct = used_percent(stats.mfu_size, stats.mfu_max_size);
        stats
    }

    /// Suspends TTL sweeps and promotion/eviction until [`resume`] is
    /// called. Lookups and writes continue normally.
    ///
    /// [`resume`]: Self::resume
    pub fn pause(&self) {
        self.core.paused.store(true, Ordering::Relaxed);
    }

    /// Resumes maintenance after a [`pause`](Self::pause).
    pub fn resume(&self) {
        self.core.paused.store(false, Ordering::Relaxed);
    }

    /// Fires the sweeper's shutdown signal and waits for the thread to
    /// finish an in-flight cycle. Idempotent; also invoked on drop. No
    /// entries are flushed.
    pub fn close(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.stop();
        }
    }

    /// Validates every shard's cross-structure invariants.
    #[cfg(any(test, debug_assertions))]
    pub fn check_invariants(&self) -> Result<(), TierCacheError> {
        for shard in self.core.shards.iter() {
            shard.check_invariants()?;
        }
        Ok(())
    }
}

impl<K, V> Drop for TierCache<K, V> {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.stop();
        }
    }
}

impl<K, V> std::fmt::Debug for TierCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TierCache")
            .field("shards", &self.core.shards.len())
            .field("mru_capacity", &self.core.mru_capacity)
            .field("mfu_capacity", &self.core.mfu_capacity)
            .field("sweeper", &self.sweeper.is_some())
            .finish_non_exhaustive()
    }
}
