// src/core/cache/entry.rs

//! A single cached response: an ordered, immutable sequence of chunks plus
//! the reader-count / mark-for-deletion protocol that lets an evictor unlink
//! an entry from the index while readers already streaming it finish safely.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;

/// One cached response body, keyed by the request URL that produced it.
///
/// `chunks` is populated exclusively by [`EntryBuilder`] while the entry is
/// privately owned by the fetching task, then frozen: once wrapped in a
/// `CacheEntry` the chunk list never changes again, so readers can walk it
/// without taking any lock.
pub struct CacheEntry {
    pub key: String,
    chunks: Vec<Bytes>,
    lifecycle: Mutex<Lifecycle>,
    /// Wakes a waiting [`CacheEntry::mark_and_drain`] whenever a reader
    /// releases. A `tokio::sync::Notify` rather than a `parking_lot::Condvar`
    /// deliberately: the drain is awaited from within an async task (the
    /// evictor), and a condvar's `wait()` would block the Tokio worker
    /// thread running that task outright, with no yield point, for as long
    /// as readers -- themselves async tasks needing a free worker thread to
    /// make progress -- take to release.
    drained: Notify,
}

struct Lifecycle {
    readers: u64,
    marked_for_deletion: bool,
}

/// Returned by [`CacheEntry::acquire_reader`] when the entry has already been
/// marked for deletion by an evictor; the caller should treat this as a miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evicted;

/// Builds a [`CacheEntry`] one chunk at a time during the single-producer
/// fetch phase. Not `Sync` with anything else: the builder is exclusively
/// owned by the task running the fetch until [`EntryBuilder::finish`] is
/// called.
pub struct EntryBuilder {
    key: String,
    chunks: Vec<Bytes>,
}

impl EntryBuilder {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            chunks: Vec::new(),
        }
    }

    /// Appends a chunk. Must only be called before [`EntryBuilder::finish`].
    pub fn append_chunk(&mut self, bytes: Bytes) {
        self.chunks.push(bytes);
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Freezes the builder into a shareable, reader-countable entry.
    pub fn finish(self) -> Arc<CacheEntry> {
        Arc::new(CacheEntry {
            key: self.key,
            chunks: self.chunks,
            lifecycle: Mutex::new(Lifecycle {
                readers: 0,
                marked_for_deletion: false,
            }),
            drained: Notify::new(),
        })
    }
}

impl CacheEntry {
    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    /// Admits a new reader unless the entry has already been marked for
    /// deletion by an evictor.
    pub fn acquire_reader(self: &Arc<Self>) -> Result<ReaderGuard, Evicted> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.marked_for_deletion {
            return Err(Evicted);
        }
        lifecycle.readers += 1;
        Ok(ReaderGuard {
            entry: Arc::clone(self),
        })
    }

    fn release_reader(&self) {
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.readers -= 1;
        // Always signal: the waiter re-checks `readers == 0` itself, and a
        // spurious wakeup when draining isn't in progress is harmless.
        self.drained.notify_one();
    }

    /// Marks the entry as no longer admitting new readers and awaits until
    /// every reader that was already admitted has released it. Must be
    /// called with no index lock held by the caller, since readers may need
    /// to make progress (and eventually call `release_reader`) independently.
    ///
    /// Waits on a `tokio::sync::Notify` rather than blocking the calling
    /// thread on a condvar: this is awaited from inside an async task (an
    /// evictor), and a thread-blocking wait here would tie up a Tokio
    /// worker thread for as long as any active reader -- itself an async
    /// task competing for worker threads to make progress -- takes to
    /// release, which under enough concurrent evictions against slow
    /// readers could starve or deadlock the runtime.
    pub async fn mark_and_drain(&self) {
        loop {
            {
                let mut lifecycle = self.lifecycle.lock();
                lifecycle.marked_for_deletion = true;
                if lifecycle.readers == 0 {
                    return;
                }
            }
            self.drained.notified().await;
        }
    }

    #[cfg(test)]
    pub(crate) fn reader_count(&self) -> u64 {
        self.lifecycle.lock().readers
    }

    #[cfg(test)]
    pub(crate) fn is_marked_for_deletion(&self) -> bool {
        self.lifecycle.lock().marked_for_deletion
    }
}

/// RAII handle proving the holder is registered as a reader of `entry`.
/// Dropping it releases the reader slot and wakes any evictor waiting in
/// `mark_and_drain`.
pub struct ReaderGuard {
    entry: Arc<CacheEntry>,
}

impl ReaderGuard {
    pub fn chunks(&self) -> &[Bytes] {
        self.entry.chunks()
    }
}

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        self.entry.release_reader();
    }
}
