//! Scored intrusive doubly-linked list.
//!
//! The building block of both cache tiers: a doubly-linked list of
//! heap-allocated nodes that carry their own key, value and a
//! monotonically increasing read-count score. The list links nodes by
//! `NonNull` pointer, so a node can be unlinked from one list and pushed
//! onto another without copying its payload.
//!
//! ## Architecture
//!
//! ```text
//!   head (insertion end)                      tail (eviction end)
//!    ▼                                          ▼
//!   [Node] ◄──► [Node] ◄──► [Node] ◄──► [Node]
//!    k,v         k,v         k,v         k,v
//!    score: 4    score: 0    score: 7    score: 1
//! ```
//!
//! ## Operations
//! - `push_head` / `push_tail`: allocate a node with score 0, O(1)
//! - `push_head_node` / `push_tail_node`: relink a detached node, O(1)
//! - `move_to_head` / `move_to_tail`: reposition in place, O(1)
//! - `detach`: unlink without freeing (ownership passes to the caller), O(1)
//! - `pop_head` / `pop_tail`: unlink and return the owned node, O(1)
//! - `high_scores(k)` / `low_scores(k)`: bounded-heap selection, O(n log k)
//!
//! `Node::read` increments the score with a single atomic fetch-add, so
//! readers holding only a shared guard on the owning structure never
//! contend with each other.
//!
//! `debug_validate_invariants()` is available in debug/test builds.

use std::collections::BinaryHeap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

/// Node in a [`ScoredList`].
///
/// Carries its own key so that a bare node handle (as returned by
/// [`ScoredList::high_scores`]) is enough to find the owning map entry.
///
/// Cache-line friendly layout with the link pointers first.
#[repr(C)]
pub struct Node<K, V> {
    prev: Option<NonNull<Node<K, V>>>,
    next: Option<NonNull<Node<K, V>>>,
    score: AtomicU64,
    key: K,
    value: V,
}

impl<K, V> Node<K, V> {
    /// Returns the node's key.
    #[inline]
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Returns the node's value without touching the score.
    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Returns a mutable reference to the value.
    #[inline]
    pub fn value_mut(&mut self) -> &mut V {
        &mut self.value
    }

    /// Reads the value, bumping the score by one.
    ///
    /// The increment is a relaxed atomic fetch-add: callers holding a
    /// shared guard on the owning shard may read concurrently without
    /// upgrading to an exclusive guard. Scores are advisory, so two
    /// concurrent reads folding into one visible increment is tolerated.
    #[inline]
    pub fn read(&self) -> &V {
        self.score.fetch_add(1, Ordering::Relaxed);
        &self.value
    }

    /// Returns the current score.
    #[inline]
    pub fn score(&self) -> u64 {
        self.score.load(Ordering::Relaxed)
    }
}

/// Intrusive doubly-linked list with per-node read scores.
///
/// Head is the insertion end, tail is the eviction end. The list owns the
/// heap allocation of every linked node; `detach` transfers that
/// ownership to the caller, `pop_head`/`pop_tail` return it as a `Box`.
pub struct ScoredList<K, V> {
    head: Option<NonNull<Node<K, V>>>,
    tail: Option<NonNull<Node<K, V>>>,
    len: usize,
}

// SAFETY: the list exclusively owns its nodes; moving it between threads
// moves the keys and values it contains.
unsafe impl<K: Send, V: Send> Send for ScoredList<K, V> {}

// SAFETY: shared access only hands out `&Node`; score mutation is atomic.
unsafe impl<K: Sync, V: Sync> Sync for ScoredList<K, V> {}

impl<K, V> ScoredList<K, V> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Returns the number of nodes in the list.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the list is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the head (insertion-end) node, if any.
    #[inline]
    pub fn head(&self) -> Option<NonNull<Node<K, V>>> {
        self.head
    }

    /// Returns the tail (eviction-end) node, if any.
    #[inline]
    pub fn tail(&self) -> Option<NonNull<Node<K, V>>> {
        self.tail
    }

    /// Allocates a node with score 0 and inserts it at the head.
    ///
    /// Returns a handle to the new node. The handle stays valid until the
    /// node is popped, detached and freed, or the list is cleared/dropped.
    pub fn push_head(&mut self, key: K, value: V) -> NonNull<Node<K, V>> {
        let node = Self::alloc(key, value);
        // SAFETY: freshly allocated node, not linked anywhere yet.
        unsafe { self.attach_head(node) };
        node
    }

    /// Allocates a node with score 0 and inserts it at the tail.
    pub fn push_tail(&mut self, key: K, value: V) -> NonNull<Node<K, V>> {
        let node = Self::alloc(key, value);
        // SAFETY: freshly allocated node, not linked anywhere yet.
        unsafe { self.attach_tail(node) };
        node
    }

    /// Relinks a detached node at the head, keeping its score.
    ///
    /// # Safety
    ///
    /// `node` must have been allocated by a `ScoredList` and must be
    /// detached (not currently linked into any list).
    pub unsafe fn push_head_node(&mut self, node: NonNull<Node<K, V>>) {
        self.attach_head(node);
    }

    /// Relinks a detached node at the tail, keeping its score.
    ///
    /// # Safety
    ///
    /// Same contract as [`push_head_node`](Self::push_head_node).
    pub unsafe fn push_tail_node(&mut self, node: NonNull<Node<K, V>>) {
        self.attach_tail(node);
    }

    /// Moves a linked node to the head. No-op if it is already there.
    ///
    /// # Safety
    ///
    /// `node` must currently be linked into this list.
    pub unsafe fn move_to_head(&mut self, node: NonNull<Node<K, V>>) {
        if self.head == Some(node) {
            return;
        }
        self.detach(node);
        self.attach_head(node);
    }

    /// Moves a linked node to the tail. No-op if it is already there.
    ///
    /// # Safety
    ///
    /// `node` must currently be linked into this list.
    pub unsafe fn move_to_tail(&mut self, node: NonNull<Node<K, V>>) {
        if self.tail == Some(node) {
            return;
        }
        self.detach(node);
        self.attach_tail(node);
    }

    /// Unlinks a node, nulling its sibling pointers and decrementing the
    /// length. The node is not freed; ownership of its allocation passes
    /// to the caller (relink it with `push_*_node` or free it with
    /// `Box::from_raw`).
    ///
    /// # Safety
    ///
    /// `node` must currently be linked into this list.
    pub unsafe fn detach(&mut self, mut node: NonNull<Node<K, V>>) {
        let n = node.as_mut();
        let prev = n.prev;
        let next = n.next;

        match prev {
            Some(mut p) => p.as_mut().next = next,
            None => self.head = next,
        }
        match next {
            Some(mut x) => x.as_mut().prev = prev,
            None => self.tail = prev,
        }

        n.prev = None;
        n.next = None;
        self.len -= 1;
    }

    /// Removes and returns the head node.
    pub fn pop_head(&mut self) -> Option<Box<Node<K, V>>> {
        let head = self.head?;
        // SAFETY: the head pointer is linked into this list by invariant,
        // and after detach we hold the only reference to the allocation.
        unsafe {
            self.detach(head);
            Some(Box::from_raw(head.as_ptr()))
        }
    }

    /// Removes and returns the tail node.
    pub fn pop_tail(&mut self) -> Option<Box<Node<K, V>>> {
        let tail = self.tail?;
        // SAFETY: as in `pop_head`.
        unsafe {
            self.detach(tail);
            Some(Box::from_raw(tail.as_ptr()))
        }
    }

    /// Returns handles to the `k` highest-scored nodes in ascending score
    /// order, ties broken by encounter order from the head. If `k >= len`
    /// every node is returned.
    ///
    /// Runs a bounded min-heap of size `k` over one traversal: a node
    /// displaces the heap root only when its score is strictly greater,
    /// which is what keeps equal-scored earlier nodes in place.
    pub fn high_scores(&self, k: usize) -> Vec<NonNull<Node<K, V>>> {
        if k == 0 || self.len == 0 {
            return Vec::new();
        }

        let mut heap: BinaryHeap<HighRank<K, V>> = BinaryHeap::with_capacity(k);
        let mut seq = 0u64;
        let mut cursor = self.head;
        while let Some(node) = cursor {
            // SAFETY: nodes reachable from `head` are valid while `&self`
            // is held.
            let n = unsafe { node.as_ref() };
            let score = n.score();
            if heap.len() < k {
                heap.push(HighRank(Ranked { score, seq, node }));
            } else if let Some(HighRank(lowest)) = heap.peek() {
                if score > lowest.score {
                    heap.pop();
                    heap.push(HighRank(Ranked { score, seq, node }));
                }
            }
            seq += 1;
            cursor = n.next;
        }

        let mut ranked: Vec<Ranked<K, V>> = heap.into_iter().map(|HighRank(r)| r).collect();
        ranked.sort_unstable();
        ranked.into_iter().map(|r| r.node).collect()
    }

    /// Returns handles to the `k` lowest-scored nodes in ascending score
    /// order, ties broken by encounter order from the tail. If `k >= len`
    /// every node is returned.
    pub fn low_scores(&self, k: usize) -> Vec<NonNull<Node<K, V>>> {
        if k == 0 || self.len == 0 {
            return Vec::new();
        }

        let mut heap: BinaryHeap<Ranked<K, V>> = BinaryHeap::with_capacity(k);
        let mut seq = 0u64;
        let mut cursor = self.tail;
        while let Some(node) = cursor {
            // SAFETY: nodes reachable from `tail` are valid while `&self`
            // is held.
            let n = unsafe { node.as_ref() };
            let score = n.score();
            if heap.len() < k {
                heap.push(Ranked { score, seq, node });
            } else if let Some(highest) = heap.peek() {
                if score < highest.score {
                    heap.pop();
                    heap.push(Ranked { score, seq, node });
                }
            }
            seq += 1;
            cursor = n.prev;
        }

        let mut ranked: Vec<Ranked<K, V>> = heap.into_vec();
        ranked.sort_unstable();
        ranked.into_iter().map(|r| r.node).collect()
    }

    /// Drops every node, freeing its key and value.
    pub fn clear(&mut self) {
        while self.pop_tail().is_some() {}
    }

    fn alloc(key: K, value: V) -> NonNull<Node<K, V>> {
        let node = Box::new(Node {
            prev: None,
            next: None,
            score: AtomicU64::new(0),
            key,
            value,
        });
        NonNull::from(Box::leak(node))
    }

    /// Attaches a detached node at the head.
    unsafe fn attach_head(&mut self, mut node: NonNull<Node<K, V>>) {
        let n = node.as_mut();
        n.prev = None;
        n.next = self.head;

        match self.head {
            Some(mut h) => h.as_mut().prev = Some(node),
            None => self.tail = Some(node),
        }

        self.head = Some(node);
        self.len += 1;
    }

    /// Attaches a detached node at the tail.
    unsafe fn attach_tail(&mut self, mut node: NonNull<Node<K, V>>) {
        let n = node.as_mut();
        n.next = None;
        n.prev = self.tail;

        match self.tail {
            Some(mut t) => t.as_mut().next = Some(node),
            None => self.head = Some(node),
        }

        self.tail = Some(node);
        self.len += 1;
    }

    #[cfg(any(test, debug_assertions))]
    /// Returns the keys in head-to-tail order.
    pub fn debug_keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        let mut keys = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(node) = cursor {
            let n = unsafe { node.as_ref() };
            keys.push(n.key.clone());
            cursor = n.next;
        }
        keys
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        if self.head.is_none() || self.tail.is_none() {
            assert!(self.head.is_none());
            assert!(self.tail.is_none());
            assert_eq!(self.len, 0);
            return;
        }

        let mut seen = std::collections::HashSet::new();
        let mut count = 0usize;
        let mut prev: Option<NonNull<Node<K, V>>> = None;
        let mut cursor = self.head;

        while let Some(node) = cursor {
            assert!(seen.insert(node.as_ptr() as usize), "cycle in list");
            let n = unsafe { node.as_ref() };
            assert_eq!(n.prev, prev);
            if n.next.is_none() {
                assert_eq!(self.tail, Some(node));
            }
            prev = Some(node);
            cursor = n.next;
            count += 1;
            assert!(count <= self.len);
        }

        assert_eq!(count, self.len);
    }
}

impl<K, V> Default for ScoredList<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Drop for ScoredList<K, V> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<K, V> std::fmt::Debug for ScoredList<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoredList")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// Heap entry for bounded top-k / bottom-k selection.
///
/// Ordered by score, then by encounter sequence so ties resolve to the
/// node met first.
struct Ranked<K, V> {
    score: u64,
    seq: u64,
    node: NonNull<Node<K, V>>,
}

impl<K, V> PartialEq for Ranked<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.seq == other.seq
    }
}

impl<K, V> Eq for Ranked<K, V> {}

impl<K, V> PartialOrd for Ranked<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<K, V> Ord for Ranked<K, V> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match self.score.cmp(&other.score) {
            std::cmp::Ordering::Equal => self.seq.cmp(&other.seq),
            ordering => ordering,
        }
    }
}

/// Heap adapter for the high-score pass.
///
/// `BinaryHeap` pops its maximum, which for top-k selection must be the
/// entry to discard: the lowest score, and among equal scores the one
/// met last (so earlier-encountered ties survive). Score order is
/// reversed, sequence order is not.
struct HighRank<K, V>(Ranked<K, V>);

impl<K, V> PartialEq for HighRank<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<K, V> Eq for HighRank<K, V> {}

impl<K, V> PartialOrd for HighRank<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<K, V> Ord for HighRank<K, V> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match other.0.score.cmp(&self.0.score) {
            std::cmp::Ordering::Equal => self.0.seq.cmp(&other.0.seq),
            ordering => ordering,
        }
    }
}
