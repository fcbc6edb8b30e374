//! Channel storage engine with write-ahead-log recovery.
//!
//! The engine owns every channel log, the subscriber cursor table and the
//! WAL journal. A publish is durable before it is visible: the WAL append
//! must succeed before the in-memory log is touched, and replaying the WAL
//! on startup reconstructs every channel to a prefix of its pre-crash state.
//!
//! # Concurrency Model
//!
//! One readers-writer lock protects the channel map and cursor table.
//! `create_channel`, `save_message`, `remove_subscriber_cursor` and
//! `get_messages` take it exclusively (a read implicitly advances the
//! caller's cursor); `channel_exists` and `channel_length` take it shared.
//! WAL appends are serialized by happening under the exclusive lock, so WAL
//! order and log order always agree.

mod chunk;
mod cursor;

use std::collections::HashMap;
use std::sync::RwLock;

use crate::config::{StorageConfig, WalConfig};
use crate::error::StorageError;
use crate::message::Message;
use crate::wal::{WalEntry, WalJournal};

use self::chunk::ChunkList;
use self::cursor::CursorTable;

/// Offset hint requesting delivery from the first unseen message.
pub const OFFSET_BEGINNING: u64 = 0;

/// Offset hint requesting delivery of only those messages appended after
/// this call.
pub const OFFSET_LATEST: u64 = u64::MAX;

/// The channel storage engine.
///
/// See the [module docs](self) for the durability and locking contract.
pub struct StorageEngine {
    journal: WalJournal,
    batch_size: u64,
    inner: RwLock<EngineInner>,
}

struct EngineInner {
    channels: HashMap<String, ChunkList>,
    cursors: CursorTable,
}

impl StorageEngine {
    /// Opens the engine, creating or resuming the WAL directory.
    ///
    /// With `sync_on_startup` enabled, every decodable WAL frame is replayed
    /// into fresh channel logs before the engine is handed out; a torn tail
    /// frame terminates replay without error. Recovery is complete before
    /// any operation can observe the engine.
    pub fn open(
        wal_config: WalConfig,
        storage_config: StorageConfig,
    ) -> Result<Self, StorageError> {
        let journal = WalJournal::open(wal_config).map_err(StorageError::OpenFailed)?;

        let engine = Self {
            journal,
            batch_size: storage_config.batch_size,
            inner: RwLock::new(EngineInner {
                channels: HashMap::new(),
                cursors: CursorTable::new(),
            }),
        };

        if storage_config.sync_on_startup {
            let replayed = engine.replay()?;
            if replayed > 0 {
                log::info!("replayed {replayed} messages from the write-ahead log");
            }
        }

        Ok(engine)
    }

    /// Replays the WAL into the in-memory channel logs.
    ///
    /// Replayed messages are not written back to the WAL; they are already
    /// there.
    fn replay(&self) -> Result<u64, StorageError> {
        let mut inner = self.inner.write().unwrap();
        let mut replayed = 0;

        for frame in self.journal.iter_from_start().map_err(StorageError::OpenFailed)? {
            let (payload, _position) = frame.map_err(StorageError::OpenFailed)?;
            let (entry, _) = WalEntry::from_bytes(&payload).map_err(StorageError::OpenFailed)?;

            inner
                .channels
                .entry(entry.channel)
                .or_default()
                .append(entry.message);
            replayed += 1;
        }

        Ok(replayed)
    }

    /// Creates a channel. Returns false if it already existed; creating a
    /// channel twice is equivalent to creating it once.
    pub fn create_channel(&self, channel: &str) -> bool {
        let mut inner = self.inner.write().unwrap();

        if inner.channels.contains_key(channel) {
            log::warn!("channel '{channel}' already exists");
            return false;
        }

        inner.channels.insert(channel.to_string(), ChunkList::new());
        log::info!("channel '{channel}' created");
        true
    }

    pub fn channel_exists(&self, channel: &str) -> bool {
        self.inner.read().unwrap().channels.contains_key(channel)
    }

    /// Current length of a channel log, if the channel exists.
    pub fn channel_length(&self, channel: &str) -> Option<u64> {
        self.inner
            .read()
            .unwrap()
            .channels
            .get(channel)
            .map(ChunkList::len)
    }

    /// Persists a message to the channel, creating the channel on demand.
    ///
    /// The WAL append strictly precedes the in-memory append: a WAL failure
    /// returns [`StorageError::ChannelUnavailable`] and leaves the channel
    /// log unchanged, so an unacknowledged publish is never observable.
    ///
    /// Returns the new length of the channel log.
    pub fn save_message(&self, channel: &str, message: Message) -> Result<u64, StorageError> {
        let mut inner = self.inner.write().unwrap();

        if !inner.channels.contains_key(channel) {
            log::info!("channel '{channel}' does not exist, creating it");
        }
        let list = inner.channels.entry(channel.to_string()).or_default();

        let entry = WalEntry::new(channel.to_string(), message);
        let payload = entry.to_bytes();
        self.journal
            .append(&payload)
            .map_err(StorageError::ChannelUnavailable)?;

        Ok(list.append(entry.message))
    }

    /// Reads the next batch for a `(subscriber, channel)` pair.
    ///
    /// `offset_hint` is either a sentinel ([`OFFSET_BEGINNING`] on the first
    /// read, [`OFFSET_LATEST`] to jump past the current contents) or the
    /// echo of the previous call's returned hint plus one; anything else is
    /// rejected with [`StorageError::InvalidOffset`]. The engine is
    /// authoritative about positions — callers only echo.
    ///
    /// Returns up to `batch_size` messages in log order together with the
    /// next offset hint. An empty channel (or a caught-up cursor) yields an
    /// empty batch, never an error.
    pub fn get_messages(
        &self,
        channel: &str,
        subscriber_id: &str,
        offset_hint: u64,
    ) -> Result<(Vec<Message>, u64), StorageError> {
        let mut inner = self.inner.write().unwrap();
        // Split the borrow so the cursor table and channel map are usable
        // side by side.
        let EngineInner { channels, cursors } = &mut *inner;

        let Some(list) = channels.get(channel) else {
            log::warn!("channel '{channel}' does not exist");
            return Err(StorageError::NoSuchChannel(channel.to_string()));
        };

        let cursor = cursors.get_or_init(subscriber_id, channel);

        if offset_hint == OFFSET_LATEST {
            if let Some(tail) = list.tail() {
                cursor.advance(tail);
            }
            let next_hint = list.len().saturating_sub(1);
            cursor.expected_offset = Some(next_hint + 1);
            return Ok((Vec::new(), next_hint));
        }

        let accepted = match cursor.expected_offset {
            Some(expected) => offset_hint == expected,
            None => offset_hint == OFFSET_BEGINNING,
        };
        if !accepted {
            return Err(StorageError::InvalidOffset(offset_hint));
        }

        let mut iter = match cursor.node() {
            Some(node) => node.next(),
            None => list.head(),
        };

        let mut batch = Vec::new();
        let mut last = None;
        while let Some(chunk) = iter {
            if batch.len() as u64 >= self.batch_size {
                break;
            }
            batch.push(chunk.message().clone());
            iter = chunk.next();
            last = Some(chunk);
        }

        let next_hint = match &last {
            Some(chunk) => chunk.index(),
            // Nothing new: re-issue the position we are parked at.
            None => cursor.node().map_or(0, |node| node.index()),
        };
        if let Some(chunk) = last {
            cursor.advance(chunk);
        }
        cursor.expected_offset = Some(next_hint + 1);

        Ok((batch, next_hint))
    }

    /// Drops the cursor for a `(subscriber, channel)` pair. Called on
    /// unsubscribe; a later re-subscribe starts from a fresh cursor.
    pub fn remove_subscriber_cursor(&self, channel: &str, subscriber_id: &str) {
        let mut inner = self.inner.write().unwrap();
        inner.cursors.remove(subscriber_id, channel);
        log::debug!("cursor removed for subscriber '{subscriber_id}' on channel '{channel}'");
    }

    /// Forces durability of every prior successful `save_message`.
    pub fn sync(&self) -> Result<(), StorageError> {
        self.journal.sync().map_err(StorageError::ChannelUnavailable)
    }
}
