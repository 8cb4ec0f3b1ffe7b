// src/core/cache/index.rs

//! The LRU index: an ordered collection of cache entries keyed by URL,
//! bounded to a fixed capacity. Mutations (`find_and_detach`, `push_front`,
//! `pop_back`) are all linearized under a single lock; an entry's position
//! can only change via detach-then-push-front, never in place.

use super::entry::CacheEntry;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Returned by [`Cache::push_front`] when the index has no free capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Full;

struct Inner {
    /// Front = most recently used, back = least recently used. A linear
    /// scan is used for lookups, matching the "small N" assumption: this
    /// is a bounded LRU of whole response bodies, not a general keyspace.
    order: VecDeque<Arc<CacheEntry>>,
}

/// The bounded LRU cache of response bodies (the spec's "Cache Index", C1).
pub struct Cache {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl Cache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                order: VecDeque::with_capacity(capacity),
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `capacity - |order|`, derived rather than tracked separately so the
    /// invariant `len() + space_left() == capacity` holds by construction.
    pub fn space_left(&self) -> usize {
        self.capacity - self.len()
    }

    /// Linear scan by key. On a match, unlinks and returns the entry;
    /// ownership passes to the caller, who must either destroy it or
    /// reinsert it via `push_front`.
    pub fn find_and_detach(&self, key: &str) -> Option<Arc<CacheEntry>> {
        let mut inner = self.inner.lock();
        let pos = inner.order.iter().position(|e| e.key == key)?;
        inner.order.remove(pos)
    }

    /// Links `entry` as the new front. Fails with `Full` if there is no
    /// free capacity; the caller keeps ownership of the entry in that case.
    pub fn push_front(&self, entry: Arc<CacheEntry>) -> Result<(), Full> {
        let mut inner = self.inner.lock();
        if inner.order.len() >= self.capacity {
            return Err(Full);
        }
        inner.order.push_front(entry);
        Ok(())
    }

    /// Unlinks and returns the back (least-recently-used) entry, if any.
    pub fn pop_back(&self) -> Option<Arc<CacheEntry>> {
        self.inner.lock().order.pop_back()
    }

    /// Fused detach + push-front: the atomic "promote on hit" operation.
    /// Leaves the index unchanged (modulo ordering) if `key` isn't present.
    pub fn find_and_promote(&self, key: &str) -> Option<Arc<CacheEntry>> {
        let mut inner = self.inner.lock();
        let pos = inner.order.iter().position(|e| e.key == key)?;
        let entry = inner.order.remove(pos)?;
        inner.order.push_front(Arc::clone(&entry));
        Some(entry)
    }

    /// Evicts the LRU victim: pops it off the back, then marks it for
    /// deletion and awaits until any readers already streaming it finish.
    /// Releases the index lock before draining, per the locking discipline
    /// in the spec -- `pop_back` already drops its lock guard before
    /// returning, so no lock is held across the drain below.
    ///
    /// `async` rather than blocking: `mark_and_drain` awaits a
    /// `tokio::sync::Notify` instead of parking the calling thread on a
    /// condvar, so an eviction against an entry with slow or still-active
    /// readers suspends this task without tying up a Tokio worker thread --
    /// readers need free worker threads of their own to make progress and
    /// eventually release.
    pub async fn evict_lru(&self) {
        if let Some(victim) = self.pop_back() {
            victim.mark_and_drain().await;
            crate::core::metrics::CACHE_EVICTIONS_TOTAL.inc();
            // `victim` drops here; the entry is physically destroyed once
            // this was the last Arc reference (any reader-held clones keep
            // it alive a little longer, but none can acquire fresh readers).
        }
    }

    /// Attempts to commit `entry` as the new MRU, evicting the current LRU
    /// victim first if the index is full. Races with other inserters are
    /// handled with a small bounded retry; if the index is still full after
    /// exhausting retries, the entry is dropped without being cached (the
    /// stream to the client already succeeded, so this is not an error).
    pub async fn commit(&self, entry: Arc<CacheEntry>) {
        const MAX_ATTEMPTS: u32 = 4;
        for attempt in 0..MAX_ATTEMPTS {
            match self.push_front(Arc::clone(&entry)) {
                Ok(()) => return,
                Err(Full) => {
                    if attempt + 1 < MAX_ATTEMPTS {
                        self.evict_lru().await;
                    }
                }
            }
        }
        // Retries exhausted under concurrent pressure: the miss is simply
        // not memoized. `entry` is dropped here without ever being linked
        // into the index.
    }
}
