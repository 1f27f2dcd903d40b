//! Cache shard: one independently locked MFU/MRU unit.
//!
//! A shard owns a key -> node map, two [`ScoredList`] tiers, an optional
//! TTL map and its per-shard counters, all behind a single
//! `parking_lot::RwLock`. Shards never lock each other, so the cache
//! scales with the shard count.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Shard                                                           │
//! │                                                                  │
//! │  map: FxHashMap<K, Entry>        ttl: FxHashMap<K, Instant>      │
//! │  ┌───────┬──────────────┐        (nearest expiry cached)         │
//! │  │ key   │ node ptr,    │                                        │
//! │  │       │ tier tag     │        counters: hits / misses /       │
//! │  └───────┴──────────────┘        evictions / overflows (atomic)  │
//! │                                                                  │
//! │  MRU tier (ScoredList)           MFU tier (ScoredList)           │
//! │  head ◄── new keys               populated only by promotion     │
//! │  tail ──► evictions              low scores demoted back to MRU  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Promotion / eviction pass
//!
//! `promote_evict` runs whenever the MRU exceeds its capacity:
//!
//! 1. Snapshot the top `overflow` MRU scores under a shared guard.
//! 2. Under the exclusive guard, promote candidates into free MFU slots
//!    in descending score order, stopping at scores below 2 (a single
//!    read does not make a key hot).
//! 3. For leftovers, compare against the lowest MFU scores: a strictly
//!    higher-scored candidate replaces the victim, which is demoted to
//!    the MRU head. Equal scores never displace a resident key.
//! 4. Evict whatever overflow remains from the MRU tail.
//!
//! Candidates snapshotted in step 1 are re-validated against the map
//! before any mutation; keys removed or re-tiered during the scan are
//! skipped. Lookups (`get`) never reorder the lists: recency is recorded
//! at set time, frequency through the per-node score.

use std::hash::Hash;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::cache::KeyInfo;
use crate::ds::scored_list::{Node, ScoredList};
use crate::metrics::ShardCounters;

#[cfg(any(test, debug_assertions))]
use crate::error::TierCacheError;

/// Which tier a key currently lives in.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Tier {
    /// Most-recently-used tier; receives all new keys at its head.
    Mru,
    /// Most-frequently-used tier; populated exclusively by promotion.
    Mfu,
}

/// Map entry: the node handle plus the tier tag that locates it.
struct Entry<K, V> {
    node: NonNull<Node<K, V>>,
    tier: Tier,
}

/// Promotion candidate snapshotted under a shared guard.
///
/// The key is cloned so a candidate that disappears during the scan is
/// recognized by map lookup without ever dereferencing the stale pointer.
struct Candidate<K, V> {
    key: K,
    score: u64,
    node: NonNull<Node<K, V>>,
}

struct ShardInner<K, V> {
    map: FxHashMap<K, Entry<K, V>>,
    mru: ScoredList<K, V>,
    mfu: ScoredList<K, V>,
    ttl: FxHashMap<K, Instant>,
    nearest_expire: Option<Instant>,
}

/// One independently locked cache unit with isolated MFU/MRU tiers.
pub(crate) struct Shard<K, V> {
    inner: RwLock<ShardInner<K, V>>,
    counters: ShardCounters,
    ttl_count: AtomicU64,
    mru_cap: usize,
    mfu_cap: usize,
    no_overflow: bool,
}

// SAFETY: all node pointers are owned by this shard and only reachable
// through the lock; score updates under shared guards are atomic.
unsafe impl<K: Send, V: Send> Send for Shard<K, V> {}
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for Shard<K, V> {}

impl<K, V> Shard<K, V>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new(mru_cap: usize, mfu_cap: usize, no_overflow: bool) -> Self {
        Self {
            inner: RwLock::new(ShardInner {
                map: FxHashMap::with_capacity_and_hasher(mru_cap + mfu_cap, Default::default()),
                mru: ScoredList::new(),
                mfu: ScoredList::new(),
                ttl: FxHashMap::default(),
                nearest_expire: None,
            }),
            counters: ShardCounters::new(),
            ttl_count: AtomicU64::new(0),
            mru_cap,
            mfu_cap,
            no_overflow,
        }
    }

    /// Looks up a key, bumping its score on a hit.
    ///
    /// Holds only the shared guard: the score bump is an atomic fetch-add
    /// and lookups never reorder the lists, so concurrent gets proceed in
    /// parallel.
    pub(crate) fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let inner = self.inner.read();
        match inner.map.get(key) {
            Some(entry) => {
                // SAFETY: map entries point at nodes owned by this shard;
                // they stay valid while the guard is held.
                let value = unsafe { entry.node.as_ref().read().clone() };
                drop(inner);
                self.counters.incr_hits();
                Some(value)
            },
            None => {
                drop(inner);
                self.counters.incr_misses();
                None
            },
        }
    }

    /// Inserts or updates a key. Returns `false` only when `no_overflow`
    /// is set and the MRU has no room for a new key.
    pub(crate) fn set(&self, key: K, value: V) -> bool {
        let mut inner = self.inner.write();
        self.set_locked(&mut inner, key, value)
    }

    /// As [`set`](Self::set), additionally arming a TTL of `ttl` from now.
    ///
    /// Re-arming an existing TTL key overwrites its expiry. A rejected
    /// set leaves the TTL state untouched.
    pub(crate) fn set_with_ttl(&self, key: K, value: V, ttl: Duration) -> bool {
        let mut inner = self.inner.write();
        if !self.set_locked(&mut inner, key.clone(), value) {
            return false;
        }

        let expiry = Instant::now() + ttl;
        if inner.ttl.insert(key, expiry).is_none() {
            self.ttl_count.fetch_add(1, Ordering::Relaxed);
        }
        inner.nearest_expire = Some(match inner.nearest_expire {
            Some(current) if current <= expiry => current,
            _ => expiry,
        });
        true
    }

    fn set_locked(&self, inner: &mut ShardInner<K, V>, key: K, value: V) -> bool {
        if let Some(entry) = inner.map.get(&key) {
            let node = entry.node;
            let tier = entry.tier;
            // SAFETY: the exclusive guard is held and the map entry
            // guarantees the node is live and in the tagged tier.
            unsafe {
                *(*node.as_ptr()).value_mut() = value;
                if tier == Tier::Mru {
                    inner.mru.move_to_head(node);
                }
            }
            return true;
        }

        if self.no_overflow && inner.mru.len() >= self.mru_cap {
            self.counters.incr_overflows();
            return false;
        }

        let node = inner.mru.push_head(key.clone(), value);
        inner.map.insert(key, Entry {
            node,
            tier: Tier::Mru,
        });
        true
    }

    /// Removes a key from the map, the TTL map and its tier list.
    /// Missing keys are a silent no-op.
    pub(crate) fn remove(&self, key: &K) {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        if let Some(entry) = inner.map.remove(key) {
            if inner.ttl.remove(key).is_some() {
                self.ttl_count.fetch_sub(1, Ordering::Relaxed);
            }
            // SAFETY: the entry's tier tag names the list holding the
            // node; after detaching we own its allocation.
            unsafe {
                match entry.tier {
                    Tier::Mru => inner.mru.detach(entry.node),
                    Tier::Mfu => inner.mfu.detach(entry.node),
                }
                drop(Box::from_raw(entry.node.as_ptr()));
            }
        }
    }

    /// Drops every MRU entry.
    pub(crate) fn flush_mru(&self) {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let mut ttl_dropped = 0u64;
        while let Some(node) = inner.mru.pop_tail() {
            inner.map.remove(node.key());
            if inner.ttl.remove(node.key()).is_some() {
                ttl_dropped += 1;
            }
        }
        if ttl_dropped > 0 {
            self.ttl_count.fetch_sub(ttl_dropped, Ordering::Relaxed);
        }
    }

    /// Drops every MFU entry.
    pub(crate) fn flush_mfu(&self) {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let mut ttl_dropped = 0u64;
        while let Some(node) = inner.mfu.pop_tail() {
            inner.map.remove(node.key());
            if inner.ttl.remove(node.key()).is_some() {
                ttl_dropped += 1;
            }
        }
        if ttl_dropped > 0 {
            self.ttl_count.fetch_sub(ttl_dropped, Ordering::Relaxed);
        }
    }

    /// Drops everything: both tiers, both maps, the nearest-expiry cache.
    pub(crate) fn flush_all(&self) {
        let mut inner = self.inner.write();
        inner.mru.clear();
        inner.mfu.clear();
        inner.map.clear();
        inner.ttl.clear();
        inner.nearest_expire = None;
        self.ttl_count.store(0, Ordering::Relaxed);
    }

    /// Returns `true` if a TTL expiry falls at or before `horizon`.
    ///
    /// Cheap short-circuit for the sweeper: shards with no imminent
    /// expiries skip the sweep entirely.
    pub(crate) fn ttl_due(&self, horizon: Instant) -> bool {
        if self.ttl_count.load(Ordering::Relaxed) == 0 {
            return false;
        }
        let inner = self.inner.read();
        matches!(inner.nearest_expire, Some(at) if at <= horizon)
    }

    /// Mark-and-sweep pass over the TTL map. Returns the eviction count.
    ///
    /// Expired keys are collected under a shared guard, then removed
    /// under the exclusive guard; the nearest-expiry cache is recomputed
    /// from the survivors before the guard drops so a concurrently armed
    /// sooner expiry is never lost.
    pub(crate) fn evict_ttl(&self) -> usize {
        if self.ttl_count.load(Ordering::Relaxed) == 0 {
            return 0;
        }

        let now = Instant::now();
        let expired: Vec<K> = {
            let inner = self.inner.read();
            inner
                .ttl
                .iter()
                .filter(|(_, &expiry)| expiry <= now)
                .map(|(key, _)| key.clone())
                .collect()
        };

        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let mut evicted = 0u64;
        for key in &expired {
            if let Some(entry) = inner.map.remove(key) {
                inner.ttl.remove(key);
                // SAFETY: as in `remove`.
                unsafe {
                    match entry.tier {
                        Tier::Mru => inner.mru.detach(entry.node),
                        Tier::Mfu => inner.mfu.detach(entry.node),
                    }
                    drop(Box::from_raw(entry.node.as_ptr()));
                }
                evicted += 1;
            }
        }
        inner.nearest_expire = inner.ttl.values().min().copied();
        drop(guard);

        if evicted > 0 {
            self.note_ttl_removals(evicted);
        }
        evicted as usize
    }

    /// MRU -> MFU promotion and MRU tail eviction.
    pub(crate) fn promote_evict(&self) {
        let overflow = {
            let inner = self.inner.read();
            inner.mru.len().saturating_sub(self.mru_cap)
        };
        if overflow == 0 {
            return;
        }

        // No MFU tier configured: plain LRU behavior.
        if self.mfu_cap == 0 {
            let mut guard = self.inner.write();
            let inner = &mut *guard;
            let excess = inner.mru.len().saturating_sub(self.mru_cap);
            self.evict_from_mru_tail(inner, excess);
            return;
        }

        // Snapshot the top `overflow` MRU scores under the shared guard.
        // The top-k pass is the expensive part; keys are cloned so stale
        // candidates can be recognized later without touching the node.
        let mut candidates: Vec<Candidate<K, V>> = {
            let inner = self.inner.read();
            inner
                .mru
                .high_scores(overflow)
                .into_iter()
                .map(|node| {
                    // SAFETY: handles from high_scores are valid while
                    // the guard is held.
                    let n = unsafe { node.as_ref() };
                    Candidate {
                        key: n.key().clone(),
                        score: n.score(),
                        node,
                    }
                })
                .collect()
        };
        // Descending score order.
        candidates.reverse();

        let mut guard = self.inner.write();
        let inner = &mut *guard;

        let mfu_free = self.mfu_cap.saturating_sub(inner.mfu.len());
        let can_promote = mfu_free.min(overflow);

        let mut promoted = 0usize;
        let mut promoted_by_score = 0usize;
        let mut skipped = 0usize;
        let mut remaining: Vec<Candidate<K, V>> = Vec::new();

        // Promotion into free MFU slots, highest scores first.
        let mut iter = candidates.into_iter();
        while promoted < can_promote {
            let Some(cand) = iter.next() else { break };
            if cand.score < 2 {
                // Descending order: nothing below is promotable either.
                remaining.push(cand);
                break;
            }
            match inner.map.get_mut(&cand.key) {
                Some(entry) if entry.tier == Tier::Mru && entry.node == cand.node => {
                    // SAFETY: revalidated via the map under the exclusive
                    // guard: same node, still in the MRU.
                    unsafe {
                        inner.mru.detach(cand.node);
                        inner.mfu.push_tail_node(cand.node);
                    }
                    entry.tier = Tier::Mfu;
                    promoted += 1;
                },
                _ => skipped += 1, // removed or re-tiered during the scan
            }
        }
        remaining.extend(iter);

        if promoted == overflow {
            return;
        }

        // Score-based promotion: replace the cheapest MFU entries whose
        // score is strictly lower. Equal scores keep the resident key.
        if !remaining.is_empty() {
            let mut bottom: Vec<(u64, NonNull<Node<K, V>>)> = inner
                .mfu
                .low_scores(remaining.len())
                .into_iter()
                // SAFETY: low_scores ran under the exclusive guard we
                // still hold, so the handles are live.
                .map(|node| (unsafe { node.as_ref() }.score(), node))
                .collect();

            let eligible = match (bottom.first(), remaining.first()) {
                (Some(&(lowest, _)), Some(best)) => lowest < best.score,
                _ => false,
            };

            if eligible {
                for cand in &remaining {
                    let valid = matches!(
                        inner.map.get(&cand.key),
                        Some(entry) if entry.tier == Tier::Mru && entry.node == cand.node
                    );
                    if !valid {
                        skipped += 1;
                        continue;
                    }

                    let mut swapped = false;
                    for i in 0..bottom.len() {
                        let (victim_score, victim) = bottom[i];
                        if cand.score > victim_score {
                            // SAFETY: victim is a live MFU node (guard
                            // held since low_scores); candidate was
                            // revalidated above.
                            let victim_key = unsafe { victim.as_ref() }.key().clone();
                            unsafe {
                                inner.mfu.detach(victim);
                                inner.mru.push_head_node(victim);
                                inner.mru.detach(cand.node);
                                inner.mfu.push_tail_node(cand.node);
                            }
                            if let Some(entry) = inner.map.get_mut(&victim_key) {
                                entry.tier = Tier::Mru;
                            }
                            if let Some(entry) = inner.map.get_mut(&cand.key) {
                                entry.tier = Tier::Mfu;
                            }
                            bottom.remove(i);
                            promoted_by_score += 1;
                            swapped = true;
                            break;
                        }
                    }
                    if !swapped {
                        // Later candidates have even lower scores.
                        break;
                    }
                }
            }
        }

        // Whatever was neither promoted nor already gone leaves from the
        // tail. Demotions can push the MRU transiently over capacity;
        // that overflow waits for the next pass.
        let to_evict = overflow.saturating_sub(promoted + promoted_by_score + skipped);
        if to_evict > 0 {
            self.evict_from_mru_tail(inner, to_evict);
        }
    }

    fn evict_from_mru_tail(&self, inner: &mut ShardInner<K, V>, n: usize) {
        let mut evicted = 0u64;
        let mut ttl_evicted = 0u64;
        for _ in 0..n {
            let Some(node) = inner.mru.pop_tail() else { break };
            inner.map.remove(node.key());
            if inner.ttl.remove(node.key()).is_some() {
                ttl_evicted += 1;
            }
            evicted += 1;
        }

        // TTL'd keys are accounted through the TTL counter path.
        if ttl_evicted > 0 {
            self.note_ttl_removals(ttl_evicted);
        }
        self.counters.add_evictions(evicted - ttl_evicted);
    }

    fn note_ttl_removals(&self, n: u64) {
        self.ttl_count.fetch_sub(n, Ordering::Relaxed);
        self.counters.add_evictions(n);
    }

    pub(crate) fn mru_len(&self) -> usize {
        self.inner.read().mru.len()
    }

    pub(crate) fn mfu_len(&self) -> usize {
        self.inner.read().mfu.len()
    }

    pub(crate) fn counters(&self) -> &ShardCounters {
        &self.counters
    }

    /// Appends `(key, tier, score)` for every resident key.
    pub(crate) fn snapshot_keys(&self, out: &mut Vec<KeyInfo<K>>) {
        let inner = self.inner.read();
        out.reserve(inner.map.len());
        for (key, entry) in &inner.map {
            // SAFETY: as in `get`.
            let score = unsafe { entry.node.as_ref() }.score();
            out.push(KeyInfo {
                key: key.clone(),
                tier: entry.tier,
                score,
            });
        }
    }

    #[cfg(any(test, debug_assertions))]
    pub(crate) fn debug_mru_keys(&self) -> Vec<K> {
        self.inner.read().mru.debug_keys()
    }

    #[cfg(any(test, debug_assertions))]
    pub(crate) fn debug_mfu_keys(&self) -> Vec<K> {
        self.inner.read().mfu.debug_keys()
    }

    /// Validates the cross-structure invariants:
    ///
    /// - the map's key set equals the union of the two tier lists
    /// - no key is in both tiers
    /// - every TTL key is in the map, and the TTL counter matches
    /// - the MFU never exceeds its capacity
    #[cfg(any(test, debug_assertions))]
    pub(crate) fn check_invariants(&self) -> Result<(), TierCacheError> {
        let inner = self.inner.read();

        if inner.mfu.len() > self.mfu_cap {
            return Err(TierCacheError::MfuOverCapacity {
                len: inner.mfu.len(),
                cap: self.mfu_cap,
            });
        }

        inner.mru.debug_validate_invariants();
        inner.mfu.debug_validate_invariants();

        let mru_keys = inner.mru.debug_keys();
        let mfu_keys = inner.mfu.debug_keys();
        if mru_keys.len() + mfu_keys.len() != inner.map.len() {
            return Err(TierCacheError::TierOutOfSync {
                map_len: inner.map.len(),
                mru_len: mru_keys.len(),
                mfu_len: mfu_keys.len(),
            });
        }
        for key in &mru_keys {
            match inner.map.get(key) {
                Some(entry) if entry.tier == Tier::Mru => {},
                _ => return Err(TierCacheError::TierTagMismatch { tier: Tier::Mru }),
            }
        }
        for key in &mfu_keys {
            match inner.map.get(key) {
                Some(entry) if entry.tier == Tier::Mfu => {},
                _ => return Err(TierCacheError::TierTagMismatch { tier: Tier::Mfu }),
            }
        }

        for key in inner.ttl.keys() {
            if !inner.map.contains_key(key) {
                return Err(TierCacheError::TtlOrphanKey);
            }
        }
        let counter = self.ttl_count.load(Ordering::Relaxed);
        if counter != inner.ttl.len() as u64 {
            return Err(TierCacheError::TtlDrift {
                counter,
                entries: inner.ttl.len(),
            });
        }

        Ok(())
    }
}
