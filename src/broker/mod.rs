//! Broker service: the operation surface an RPC facade translates to.
//!
//! The broker guards channel existence, synthesizes messages on publish via
//! the injected [`Generator`] capability, and runs one delivery session per
//! subscribe call. It owns only the subscriber registry and session
//! lifetimes; all message state lives in the [`StorageEngine`].

mod session;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{BrokerError, StorageError};
use crate::message::{Generator, Message, StartOffset, Subscriber, SystemGenerator};
use crate::storage::StorageEngine;

pub use self::session::Subscription;

/// The broker service.
///
/// Cheap to share: wrap it in an `Arc` (as [`Broker::new`] does) and clone
/// the handle into every transport task.
pub struct Broker {
    engine: Arc<StorageEngine>,
    generator: Arc<dyn Generator>,
    /// channel -> subscriber id -> subscriber. Introspection only; delivery
    /// goes through engine cursors, never through fan-out.
    registry: RwLock<HashMap<String, HashMap<String, Subscriber>>>,
    shutdown_token: CancellationToken,
    sessions: TaskTracker,
}

impl Broker {
    /// Creates a broker over the given engine with the system ID generator.
    pub fn new(engine: Arc<StorageEngine>) -> Arc<Self> {
        Self::with_generator(engine, Arc::new(SystemGenerator))
    }

    /// Creates a broker with a custom [`Generator`], for deterministic tests
    /// or externally coordinated IDs.
    pub fn with_generator(engine: Arc<StorageEngine>, generator: Arc<dyn Generator>) -> Arc<Self> {
        Arc::new(Self {
            engine,
            generator,
            registry: RwLock::new(HashMap::new()),
            shutdown_token: CancellationToken::new(),
            sessions: TaskTracker::new(),
        })
    }

    /// The engine this broker publishes into.
    pub fn engine(&self) -> &Arc<StorageEngine> {
        &self.engine
    }

    /// Creates a channel. Creating an existing channel is a success.
    pub fn create_channel(&self, channel: &str) -> Result<(), BrokerError> {
        if channel.is_empty() {
            return Err(BrokerError::InvalidArgument("channel must not be empty"));
        }

        self.engine.create_channel(channel);
        Ok(())
    }

    /// Publishes a message to the channel, creating the channel on demand.
    ///
    /// The message is synthesized here: a fresh unique ID, the caller's
    /// payload, and the current timestamp.
    pub fn publish(&self, channel: &str, content: Vec<u8>) -> Result<(), BrokerError> {
        if channel.is_empty() {
            return Err(BrokerError::InvalidArgument("channel must not be empty"));
        }
        if content.is_empty() {
            return Err(BrokerError::InvalidArgument("content must not be empty"));
        }

        let message = Message {
            id: self.generator.message_id(),
            content,
            created_at: self.generator.timestamp(),
        };

        match self.engine.save_message(channel, message) {
            Ok(_) => {
                log::info!("message published to channel '{channel}'");
                Ok(())
            }
            // Unreachable today: save_message creates the channel lazily.
            Err(StorageError::NoSuchChannel(_)) => {
                Err(BrokerError::FailedPrecondition("channel does not exist"))
            }
            Err(e) => {
                log::error!("failed to save message on channel '{channel}': {e}");
                Err(BrokerError::Internal(e))
            }
        }
    }

    /// Opens a delivery session on an existing channel.
    ///
    /// The session pulls batches from the engine every `pull_interval` and
    /// feeds them to the returned [`Subscription`]. Subscribing to a missing
    /// channel is rejected; subscribers cannot create channels.
    pub fn subscribe(
        self: &Arc<Self>,
        channel: &str,
        offset: StartOffset,
        pull_interval: Duration,
        remote_addr: &str,
    ) -> Result<Subscription, BrokerError> {
        if channel.is_empty() {
            return Err(BrokerError::InvalidArgument("channel must not be empty"));
        }
        if pull_interval < Duration::from_millis(1) {
            return Err(BrokerError::InvalidArgument(
                "pull interval must be at least one millisecond",
            ));
        }
        if remote_addr.is_empty() {
            return Err(BrokerError::FailedPrecondition(
                "remote address is unknown",
            ));
        }

        if !self.engine.channel_exists(channel) {
            log::error!("cannot subscribe to non-existent channel '{channel}'");
            return Err(BrokerError::NoSuchChannel(channel.to_string()));
        }

        let subscriber = Subscriber {
            id: self.generator.subscriber_id(),
            remote_addr: remote_addr.to_string(),
        };

        {
            let mut registry = self.registry.write().unwrap();
            registry
                .entry(channel.to_string())
                .or_default()
                .insert(subscriber.id.clone(), subscriber.clone());
        }
        log::info!(
            "subscriber '{}' ({}) added to channel '{channel}'",
            subscriber.id,
            subscriber.remote_addr
        );

        let token = self.shutdown_token.child_token();
        let (outbound_tx, outbound_rx) = mpsc::channel(session::OUTBOUND_QUEUE_CAPACITY);

        self.sessions.spawn(session::run_pull_loop(
            Arc::clone(self),
            Arc::clone(&self.engine),
            subscriber.clone(),
            channel.to_string(),
            offset,
            pull_interval,
            outbound_tx,
            token.clone(),
        ));

        Ok(Subscription::new(
            subscriber,
            channel.to_string(),
            outbound_rx,
            token,
        ))
    }

    /// Deregisters a subscriber and drops its engine cursor.
    ///
    /// Invoked by the session teardown; safe to call for a subscriber that
    /// is already gone.
    pub fn unsubscribe(&self, subscriber: &Subscriber, channel: &str) {
        log::warn!(
            "unsubscribing client '{}' ({}) from channel '{channel}'",
            subscriber.id,
            subscriber.remote_addr
        );

        {
            let mut registry = self.registry.write().unwrap();
            if let Some(subscribers) = registry.get_mut(channel) {
                subscribers.remove(&subscriber.id);
            }
        }

        self.engine.remove_subscriber_cursor(channel, &subscriber.id);
    }

    /// Number of live subscribe sessions on a channel.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.registry
            .read()
            .unwrap()
            .get(channel)
            .map_or(0, HashMap::len)
    }

    /// Graceful shutdown: cancels every session, makes the WAL durable and
    /// waits for session tasks up to `timeout`.
    ///
    /// Returns true when every session drained within the timeout.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        log::info!("broker shutting down");
        self.shutdown_token.cancel();

        if let Err(e) = self.engine.sync() {
            log::error!("failed to sync write-ahead log during shutdown: {e}");
        }

        self.sessions.close();
        match tokio::time::timeout(timeout, self.sessions.wait()).await {
            Ok(()) => true,
            Err(_) => {
                log::warn!("shutdown timed out with sessions still draining, forcing termination");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StorageConfig, WalConfig};
    use tempfile::TempDir;

    fn open_broker(dir: &TempDir) -> Arc<Broker> {
        let wal_config = WalConfig {
            dir_path: dir.path().to_path_buf(),
            ..WalConfig::default()
        };
        let engine = StorageEngine::open(wal_config, StorageConfig::default()).unwrap();
        Broker::new(Arc::new(engine))
    }

    #[test]
    fn test_create_channel_rejects_empty_key() {
        let dir = TempDir::new().unwrap();
        let broker = open_broker(&dir);

        let err = broker.create_channel("").unwrap_err();
        assert!(matches!(err, BrokerError::InvalidArgument(_)));
    }

    #[test]
    fn test_create_channel_twice_is_success() {
        let dir = TempDir::new().unwrap();
        let broker = open_broker(&dir);

        broker.create_channel("orders").unwrap();
        broker.create_channel("orders").unwrap();
        assert!(broker.engine().channel_exists("orders"));
    }

    #[test]
    fn test_publish_validates_input() {
        let dir = TempDir::new().unwrap();
        let broker = open_broker(&dir);

        assert!(matches!(
            broker.publish("", b"x".to_vec()),
            Err(BrokerError::InvalidArgument(_))
        ));
        assert!(matches!(
            broker.publish("orders", Vec::new()),
            Err(BrokerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_publish_creates_channel_lazily() {
        let dir = TempDir::new().unwrap();
        let broker = open_broker(&dir);

        broker.publish("orders", b"payload".to_vec()).unwrap();
        assert!(broker.engine().channel_exists("orders"));
        assert_eq!(broker.engine().channel_length("orders"), Some(1));
    }

    #[tokio::test]
    async fn test_subscribe_validates_input() {
        let dir = TempDir::new().unwrap();
        let broker = open_broker(&dir);
        broker.create_channel("orders").unwrap();

        assert!(matches!(
            broker.subscribe("", StartOffset::Beginning, Duration::from_millis(5), "peer"),
            Err(BrokerError::InvalidArgument(_))
        ));
        assert!(matches!(
            broker.subscribe("orders", StartOffset::Beginning, Duration::ZERO, "peer"),
            Err(BrokerError::InvalidArgument(_))
        ));
        assert!(matches!(
            broker.subscribe("orders", StartOffset::Beginning, Duration::from_millis(5), ""),
            Err(BrokerError::FailedPrecondition(_))
        ));
    }

    #[tokio::test]
    async fn test_subscribe_requires_existing_channel() {
        let dir = TempDir::new().unwrap();
        let broker = open_broker(&dir);

        let err = broker
            .subscribe("ghost", StartOffset::Beginning, Duration::from_millis(5), "peer")
            .unwrap_err();
        assert!(matches!(err, BrokerError::NoSuchChannel(_)));
        assert_eq!(broker.subscriber_count("ghost"), 0);
    }
}
