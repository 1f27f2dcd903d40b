//! Background maintenance sweeper.
//!
//! A single thread wakes every `tick` and walks the shards in order,
//! running the TTL sweep (only where an expiry falls within the next
//! tick) followed by the promotion/eviction pass. A paused cache skips
//! the whole cycle. Maintenance is best effort: a missed cycle only
//! leaves the MRU temporarily over capacity, never inconsistent.
//!
//! Shutdown goes through [`ShutdownSignal`], a condition variable behind
//! a cloneable handle, rather than a bare sleep: `TierCache::close` (and
//! any externally retained clone from [`Config::shutdown_signal`])
//! interrupts a waiting sweeper immediately instead of stalling for the
//! rest of the tick.
//!
//! [`Config::shutdown_signal`]: crate::config::Config::shutdown_signal

use std::hash::Hash;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::cache::Core;

/// Cancellation signal for the background sweeper.
///
/// A cloneable handle over a shared stop flag. Firing it is idempotent
/// and wakes a sweeper sleeping out its tick immediately; the in-flight
/// maintenance cycle, if any, completes first.
///
/// The cache fires its own signal from [`TierCache::close`] and on drop.
/// To cancel maintenance from outside the cache, create a signal, keep a
/// clone, and pass it in [`Config::shutdown_signal`]:
///
/// ```
/// use tiercache::prelude::*;
///
/// let signal = ShutdownSignal::new();
/// let cache: TierCache<String, u64> = TierCache::new(Config {
///     mru_size: 64,
///     shard_count: 2,
///     auto_evict_interval: 50,
///     shutdown_signal: Some(signal.clone()),
///     ..Config::default()
/// })
/// .unwrap();
///
/// signal.shutdown(); // maintenance stops; the cache itself keeps working
/// cache.set("k".to_string(), 1);
/// ```
///
/// [`TierCache::close`]: crate::cache::TierCache::close
/// [`Config::shutdown_signal`]: crate::config::Config::shutdown_signal
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal {
    inner: Arc<SignalState>,
}

#[derive(Debug, Default)]
struct SignalState {
    stopped: Mutex<bool>,
    tick: Condvar,
}

impl ShutdownSignal {
    /// Creates an unfired signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal, stopping the sweeper bound to it.
    pub fn shutdown(&self) {
        *self.inner.stopped.lock() = true;
        self.inner.tick.notify_all();
    }

    /// Blocks for up to `tick`. Returns `true` once the signal fired.
    fn wait(&self, tick: Duration) -> bool {
        let mut stopped = self.inner.stopped.lock();
        if !*stopped {
            let _ = self.inner.tick.wait_for(&mut stopped, tick);
        }
        *stopped
    }
}

/// Handle to the background maintenance thread.
pub(crate) struct Sweeper {
    handle: JoinHandle<()>,
    signal: ShutdownSignal,
}

impl Sweeper {
    /// Spawns the sweeper over `core`, cycling every `tick` until
    /// `signal` fires.
    pub(crate) fn spawn<K, V>(
        core: Arc<Core<K, V>>,
        tick: Duration,
        signal: ShutdownSignal,
    ) -> Self
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        let thread_signal = signal.clone();
        let handle = thread::spawn(move || {
            while !thread_signal.wait(tick) {
                run_cycle(&core, tick);
            }
        });

        Self { handle, signal }
    }

    /// Fires the shutdown signal and waits for the thread to finish. An
    /// in-flight cycle completes; a sleeping sweeper wakes immediately.
    pub(crate) fn stop(self) {
        self.signal.shutdown();
        let _ = self.handle.join();
    }
}

/// One maintenance cycle over every shard.
fn run_cycle<K, V>(core: &Core<K, V>, tick: Duration)
where
    K: Eq + Hash + Clone,
{
    if core.paused.load(std::sync::atomic::Ordering::Relaxed) {
        if core.evict_log {
            debug!("evictions paused, skipping maintenance cycle");
        }
        return;
    }

    let mut ttl_timings = Timings::default();
    let mut promo_timings = Timings::default();

    for shard in core.shards.iter() {
        // Sweep only shards with an expiry inside the coming tick.
        if shard.ttl_due(Instant::now() + tick) {
            let start = Instant::now();
            let evicted = shard.evict_ttl();
            if core.evict_log && evicted > 0 {
                ttl_timings.record(start.elapsed());
            }
        }

        let start = Instant::now();
        shard.promote_evict();
        if core.evict_log {
            promo_timings.record(start.elapsed());
        }
    }

    if core.evict_log {
        if ttl_timings.count > 0 {
            debug!(
                cumulative = ?ttl_timings.sum,
                min = ?ttl_timings.min,
                max = ?ttl_timings.max,
                "ttl sweep"
            );
        }
        debug!(
            cumulative = ?promo_timings.sum,
            min = ?promo_timings.min,
            max = ?promo_timings.max,
            "promote-evict"
        );
    }
}

/// Min/max/cumulative duration accumulator for the timing log.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Timings {
    count: u64,
    sum: Duration,
    min: Duration,
    max: Duration,
}

impl Timings {
    fn record(&mut self, elapsed: Duration) {
        if self.count == 0 || elapsed < self.min {
            self.min = elapsed;
        }
        if elapsed > self.max {
            self.max = elapsed;
        }
        self.sum += elapsed;
        self.count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_starts_unfired_and_latches() {
        let signal = ShutdownSignal::new();
        assert!(!signal.wait(Duration::from_millis(1)));

        signal.shutdown();
        signal.shutdown();
        assert!(signal.wait(Duration::from_millis(1)));
    }

    #[test]
    fn clones_share_one_signal() {
        let signal = ShutdownSignal::new();
        let remote = signal.clone();

        remote.shutdown();
        assert!(signal.wait(Duration::ZERO));
    }

    #[test]
    fn timings_track_min_max_and_sum() {
        let mut timings = Timings::default();
        timings.record(Duration::from_millis(4));
        timings.record(Duration::from_millis(1));
        timings.record(Duration::from_millis(7));

        assert_eq!(timings.count, 3);
        assert_eq!(timings.min, Duration::from_millis(1));
        assert_eq!(timings.max, Duration::from_millis(7));
        assert_eq!(timings.sum, Duration::from_millis(12));
    }

    #[test]
    fn empty_timings_stay_zeroed() {
        let timings = Timings::default();
        assert_eq!(timings, Timings::default());
        assert_eq!(timings.count, 0);
    }
}
