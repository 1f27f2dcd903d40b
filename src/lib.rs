//! tiercache: a sharded two-tier MFU/MRU key/value cache.
//!
//! An embedded, in-process cache for read-heavy concurrent workloads.
//! Keys are admitted to a most-recently-used tier; keys that accumulate
//! reads are promoted to a most-frequently-used tier that shelters them
//! from large sequential scans. Per-key TTLs and a background maintenance
//! sweeper are optional.
//!
//! ```
//! use tiercache::prelude::*;
//!
//! let cache: TierCache<String, u64> = TierCache::new(Config {
//!     mfu_size: 64,
//!     mru_size: 256,
//!     shard_count: 8,
//!     ..Config::default()
//! })
//! .unwrap();
//!
//! cache.set("answer".to_string(), 42);
//! assert_eq!(cache.get(&"answer".to_string()), Some(42));
//! ```

pub mod cache;
pub mod config;
pub mod ds;
pub mod error;
pub mod maintenance;
pub mod metrics;
pub mod shard;

pub mod prelude;
