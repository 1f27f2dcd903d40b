//! Cache construction parameters.

use crate::maintenance::ShutdownSignal;

/// Configuration for a [`TierCache`](crate::cache::TierCache).
///
/// Tier sizes are key counts for the whole cache; each shard receives
/// `ceil(size / shard_count)` slots per tier, so the realized total may
/// exceed the requested one by up to `shard_count - 1` keys per tier.
///
/// # Example
///
/// ```
/// use tiercache::config::Config;
///
/// let config = Config {
///     mfu_size: 256,
///     mru_size: 1024,
///     shard_count: 16,
///     ..Config::default()
/// };
/// assert!(!config.no_overflow);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// MFU tier capacity in keys. 0 disables the MFU tier entirely and the
    /// cache degenerates to a plain LRU over the MRU tier.
    pub mfu_size: usize,
    /// MRU tier capacity in keys. Must be at least 1.
    pub mru_size: usize,
    /// Interval in milliseconds between background maintenance passes
    /// (TTL sweep + promotion/eviction). 0 disables the background
    /// sweeper; promotion/eviction then runs inline on every set.
    pub auto_evict_interval: u64,
    /// Emit per-cycle maintenance timing logs via `tracing`.
    pub evict_log: bool,
    /// Number of shards; must be a power of two. 0 selects the default
    /// of 512.
    pub shard_count: usize,
    /// Reject sets of new keys that would push the MRU tier past its
    /// capacity, instead of tolerating overflow until the next
    /// maintenance pass.
    pub no_overflow: bool,
    /// External cancellation signal for the background sweeper. Keep a
    /// clone and call [`ShutdownSignal::shutdown`] to stop maintenance
    /// from outside the cache; [`TierCache::close`] and drop fire the
    /// same signal. Unused when the sweeper is disabled
    /// (`auto_evict_interval` 0).
    ///
    /// [`TierCache::close`]: crate::cache::TierCache::close
    pub shutdown_signal: Option<ShutdownSignal>,
}

/// Shard count used when [`Config::shard_count`] is 0.
pub const DEFAULT_SHARD_COUNT: usize = 512;
