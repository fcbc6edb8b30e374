use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwapOption;

use crate::message::Message;

/// One node of a channel log.
///
/// Chunks are immutable once linked: the message and index never change, and
/// `next` transitions exactly once from empty to the successor chunk.
/// Subscriber cursors hold `Arc<Chunk>` handles directly, so a batch read is
/// O(batch) regardless of log length or other subscribers' positions.
pub(crate) struct Chunk {
    message: Message,
    index: u64,
    next: ArcSwapOption<Chunk>,
}

impl Chunk {
    pub(crate) fn message(&self) -> &Message {
        &self.message
    }

    /// Zero-based position of this chunk in its channel log.
    pub(crate) fn index(&self) -> u64 {
        self.index
    }

    pub(crate) fn next(&self) -> Option<Arc<Chunk>> {
        self.next.load_full()
    }
}

/// An append-only linked sequence of messages with O(1) append, length and
/// tail access.
///
/// Appends happen under the storage engine's exclusive lock (single writer);
/// the atomics let cursor holders traverse `next` links without taking that
/// lock path through a re-scan.
#[derive(Default)]
pub(crate) struct ChunkList {
    head: ArcSwapOption<Chunk>,
    tail: ArcSwapOption<Chunk>,
    len: AtomicU64,
}

impl ChunkList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends a message and returns the new length of the log.
    pub(crate) fn append(&self, message: Message) -> u64 {
        let index = self.len.load(Ordering::Acquire);
        let chunk = Arc::new(Chunk {
            message,
            index,
            next: ArcSwapOption::const_empty(),
        });

        match self.tail.load_full() {
            Some(tail) => tail.next.store(Some(Arc::clone(&chunk))),
            None => self.head.store(Some(Arc::clone(&chunk))),
        }
        self.tail.store(Some(chunk));
        self.len.store(index + 1, Ordering::Release);

        index + 1
    }

    pub(crate) fn len(&self) -> u64 {
        self.len.load(Ordering::Acquire)
    }

    /// First chunk, or `None` while the log is empty.
    pub(crate) fn head(&self) -> Option<Arc<Chunk>> {
        self.head.load_full()
    }

    /// Last chunk, or `None` while the log is empty.
    pub(crate) fn tail(&self) -> Option<Arc<Chunk>> {
        self.tail.load_full()
    }
}
