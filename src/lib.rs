//! Courier: an in-memory, single-node, topic-oriented message broker with a
//! durable append log.
//!
//! Publishers create named channels and append opaque binary messages;
//! subscribers open long-lived sessions and receive messages from a chosen
//! starting offset on a pull cadence of their choosing. Durability comes
//! from a segmented write-ahead log: every publish is framed and appended to
//! disk before it becomes visible, and startup replay reconstructs all
//! channel state from the log.
//!
//! # Architecture
//!
//! - [`wal`] — CRC-checked framed journal over bounded segment files.
//! - [`storage`] — the engine owning channel logs, subscriber cursors and
//!   the WAL; all reads and writes go through it.
//! - [`broker`] — the service surface: channel creation, publish, and
//!   per-subscriber delivery sessions pulling by cursor.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use courier::{Broker, BrokerConfig, StartOffset, StorageEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BrokerConfig::default();
//!     let engine = Arc::new(StorageEngine::open(config.wal, config.storage)?);
//!     let broker = Broker::new(engine);
//!
//!     broker.create_channel("orders")?;
//!     broker.publish("orders", b"first".to_vec())?;
//!
//!     let mut subscription = broker.subscribe(
//!         "orders",
//!         StartOffset::Beginning,
//!         Duration::from_millis(10),
//!         "127.0.0.1:9999",
//!     )?;
//!     while let Some(message) = subscription.recv().await {
//!         println!("{}: {} bytes", message.id, message.content.len());
//!     }
//!
//!     broker.shutdown(config.server.graceful_shutdown_timeout).await;
//!     Ok(())
//! }
//! ```

pub mod broker;
pub mod config;
pub mod error;
pub mod message;
pub mod storage;
pub mod wal;

pub use broker::{Broker, Subscription};
pub use config::{BrokerConfig, ServerConfig, StorageConfig, WalConfig};
pub use error::{BrokerError, StorageError};
pub use message::{Generator, Message, StartOffset, Subscriber, SystemGenerator};
pub use storage::{OFFSET_BEGINNING, OFFSET_LATEST, StorageEngine};
pub use wal::{WalEntry, WalJournal, WalPosition};
