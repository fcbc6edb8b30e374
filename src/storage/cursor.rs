use std::collections::HashMap;
use std::sync::Arc;

use super::chunk::Chunk;

/// Per-(subscriber, channel) read position.
pub(crate) struct Cursor {
    /// Handle to the last delivered chunk. `None` means before-first: the
    /// next batch starts at the channel log's head.
    node: Option<Arc<Chunk>>,

    /// The only non-sentinel offset hint the engine will accept on the next
    /// read (echo semantics). `None` until the first read issues one.
    pub(crate) expected_offset: Option<u64>,
}

impl Cursor {
    fn new() -> Self {
        Self {
            node: None,
            expected_offset: None,
        }
    }

    pub(crate) fn node(&self) -> Option<&Arc<Chunk>> {
        self.node.as_ref()
    }

    /// Moves the cursor forward to `chunk`. Positions never move backward.
    pub(crate) fn advance(&mut self, chunk: Arc<Chunk>) {
        debug_assert!(
            self.node.as_ref().is_none_or(|prev| prev.index() <= chunk.index()),
            "cursor moved backward"
        );
        self.node = Some(chunk);
    }
}

/// Two-level map `subscriber_id -> channel_key -> Cursor`.
///
/// Entries are created lazily by the first read and removed when the
/// subscriber unsubscribes from the channel.
#[derive(Default)]
pub(crate) struct CursorTable {
    cursors: HashMap<String, HashMap<String, Cursor>>,
}

impl CursorTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the cursor for the pair, creating it (before-first) on demand.
    pub(crate) fn get_or_init(&mut self, subscriber_id: &str, channel: &str) -> &mut Cursor {
        self.cursors
            .entry(subscriber_id.to_string())
            .or_default()
            .entry(channel.to_string())
            .or_insert_with(Cursor::new)
    }

    /// Drops the pair's cursor, pruning the subscriber entry when it was the
    /// last channel.
    pub(crate) fn remove(&mut self, subscriber_id: &str, channel: &str) {
        if let Some(channels) = self.cursors.get_mut(subscriber_id) {
            channels.remove(channel);
            if channels.is_empty() {
                self.cursors.remove(subscriber_id);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, subscriber_id: &str, channel: &str) -> bool {
        self.cursors
            .get(subscriber_id)
            .is_some_and(|channels| channels.contains_key(channel))
    }
}
