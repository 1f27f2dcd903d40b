pub use crate::cache::{KeyInfo, TierCache};
pub use crate::config::Config;
pub use crate::error::TierCacheError;
pub use crate::maintenance::ShutdownSignal;
pub use crate::metrics::Stats;
pub use crate::shard::Tier;
