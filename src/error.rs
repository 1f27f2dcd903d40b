//! Error taxonomy for the cache.
//!
//! Construction is the only path that surfaces a Rust error:
//! [`TierCacheError`] names the two configurations the cache refuses.
//! The cache's other failure modes are deliberately not errors — a full
//! MRU under `no_overflow` comes back as `false` from set (and bumps the
//! overflows counter), a lookup miss comes back as `None` (and bumps the
//! misses counter), and missing-key removals or flushes of empty tiers
//! are silent no-ops.
//!
//! Debug and test builds add `check_invariants` helpers that report
//! broken cross-structure bookkeeping through the same enum.

use std::fmt;

use crate::shard::Tier;

/// Everything the cache can refuse or, in debug builds, find broken.
///
/// # Example
///
/// ```
/// use tiercache::cache::TierCache;
/// use tiercache::config::Config;
/// use tiercache::error::TierCacheError;
///
/// let err = TierCache::<String, u64>::new(Config {
///     mru_size: 64,
///     shard_count: 24,
///     ..Config::default()
/// })
/// .unwrap_err();
/// assert_eq!(err, TierCacheError::ShardCountNotPowerOfTwo(24));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierCacheError {
    /// Keys are routed by masking their hash, so the shard count must be
    /// a power of two. Carries the rejected count.
    ShardCountNotPowerOfTwo(usize),
    /// Every new key is admitted to the MRU tier, so it needs at least
    /// one slot.
    ZeroMruCapacity,
    /// A debug check found the MFU tier holding more keys than its
    /// capacity allows.
    MfuOverCapacity {
        /// Keys currently in the MFU list.
        len: usize,
        /// The shard's MFU capacity.
        cap: usize,
    },
    /// A debug check found the key map and the two tier lists tracking
    /// different populations.
    TierOutOfSync {
        /// Keys in the map.
        map_len: usize,
        /// Keys reachable in the MRU list.
        mru_len: usize,
        /// Keys reachable in the MFU list.
        mfu_len: usize,
    },
    /// A debug check found a node in one tier whose map entry names the
    /// other tier, or no map entry at all.
    TierTagMismatch {
        /// The list the node was found in.
        tier: Tier,
    },
    /// A debug check found a TTL entry for a key that is not resident.
    TtlOrphanKey,
    /// A debug check found the TTL counter disagreeing with the TTL map.
    TtlDrift {
        /// The shard's TTL counter.
        counter: u64,
        /// Entries actually in the TTL map.
        entries: usize,
    },
}

impl fmt::Display for TierCacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShardCountNotPowerOfTwo(count) => {
                write!(f, "shard count {count} is not a power of two")
            },
            Self::ZeroMruCapacity => write!(f, "mru_size must be at least 1"),
            Self::MfuOverCapacity { len, cap } => {
                write!(f, "mfu tier holds {len} keys but its capacity is {cap}")
            },
            Self::TierOutOfSync {
                map_len,
                mru_len,
                mfu_len,
            } => {
                write!(
                    f,
                    "key map tracks {map_len} keys but the tiers hold {mru_len} + {mfu_len}"
                )
            },
            Self::TierTagMismatch { tier } => {
                let list = match tier {
                    Tier::Mru => "mru",
                    Tier::Mfu => "mfu",
                };
                write!(f, "{list} list and key map disagree about a node's tier")
            },
            Self::TtlOrphanKey => write!(f, "ttl entry for a key that is not resident"),
            Self::TtlDrift { counter, entries } => {
                write!(f, "ttl counter {counter} does not match {entries} ttl entries")
            },
        }
    }
}

impl std::error::Error for TierCacheError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_count_error_names_the_offending_count() {
        let err = TierCacheError::ShardCountNotPowerOfTwo(6);
        assert!(err.to_string().contains('6'));
        assert!(err.to_string().contains("power of two"));
    }

    #[test]
    fn every_variant_renders_a_message() {
        let variants = [
            TierCacheError::ShardCountNotPowerOfTwo(3),
            TierCacheError::ZeroMruCapacity,
            TierCacheError::MfuOverCapacity { len: 5, cap: 4 },
            TierCacheError::TierOutOfSync {
                map_len: 3,
                mru_len: 1,
                mfu_len: 1,
            },
            TierCacheError::TierTagMismatch { tier: Tier::Mfu },
            TierCacheError::TtlOrphanKey,
            TierCacheError::TtlDrift {
                counter: 2,
                entries: 1,
            },
        ];
        for err in variants {
            assert!(!err.to_string().is_empty());
        }
    }

    #[test]
    fn boxes_as_a_standard_error() {
        let err: Box<dyn std::error::Error> = Box::new(TierCacheError::ZeroMruCapacity);
        assert_eq!(err.to_string(), "mru_size must be at least 1");
    }

    #[test]
    fn comparable_and_cloneable() {
        let a = TierCacheError::MfuOverCapacity { len: 2, cap: 1 };
        assert_eq!(a.clone(), a);
        assert_ne!(a, TierCacheError::ZeroMruCapacity);
    }
}
