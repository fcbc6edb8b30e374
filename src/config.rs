use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the segmented write-ahead log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalConfig {
    /// Directory holding the segment files.
    pub dir_path: PathBuf,

    /// Maximum bytes per segment before rolling over to a new file.
    ///
    /// Default: 50 MiB
    pub segment_size: u64,

    /// Extension given to segment files, without the leading dot.
    ///
    /// Default: `wal`
    pub segment_file_extension: String,

    /// Fsync after every frame. Safest and slowest.
    ///
    /// Default: false
    pub sync_per_write: bool,

    /// When `sync_per_write` is false, fsync once this many unsynced bytes
    /// have accumulated. 0 disables automatic syncing entirely.
    ///
    /// Default: 0
    pub bytes_per_sync: u64,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            dir_path: PathBuf::from("wal"),
            segment_size: 50 * 1024 * 1024, // 50 MiB
            segment_file_extension: "wal".to_string(),
            sync_per_write: false,
            bytes_per_sync: 0,
        }
    }
}

/// Configuration for the storage engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Maximum messages returned by a single cursor read.
    ///
    /// Default: 500
    pub batch_size: u64,

    /// Replay the WAL into memory on startup. Disabling this starts the
    /// engine empty; existing segments are preserved and appended to.
    ///
    /// Default: true
    pub sync_on_startup: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            sync_on_startup: true,
        }
    }
}

/// Configuration consumed by the transport layer embedding the broker.
///
/// The core does not bind sockets itself; these knobs are carried here so a
/// single config file covers the whole process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TCP port for the RPC facade.
    ///
    /// Default: 50051
    pub port: u16,

    /// Maximum inbound request size in bytes.
    ///
    /// Default: 4 MiB
    pub max_recv_msg_size: usize,

    /// How long shutdown waits for in-flight sessions before forcing
    /// termination.
    ///
    /// Default: 5 seconds
    pub graceful_shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 50051,
            max_recv_msg_size: 4 * 1024 * 1024, // 4 MiB
            graceful_shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Top-level broker configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub wal: WalConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
}
