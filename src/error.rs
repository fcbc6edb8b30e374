use std::fmt;
use std::io;

/// Errors produced by the storage engine.
#[derive(Debug)]
pub enum StorageError {
    /// The WAL directory could not be opened or replayed on startup.
    OpenFailed(io::Error),
    /// The requested channel does not exist.
    NoSuchChannel(String),
    /// The offset hint is neither a sentinel nor the token issued by the
    /// previous read for this (subscriber, channel) pair.
    InvalidOffset(u64),
    /// The WAL append failed; the in-memory log was not mutated.
    ChannelUnavailable(io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::OpenFailed(e) => {
                write!(f, "failed to open write-ahead log: {e}")
            }
            StorageError::NoSuchChannel(channel) => {
                write!(f, "channel '{channel}' does not exist")
            }
            StorageError::InvalidOffset(offset) => {
                write!(f, "invalid offset {offset} provided for message retrieval")
            }
            StorageError::ChannelUnavailable(e) => {
                write!(f, "channel unavailable, write-ahead log append failed: {e}")
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::OpenFailed(e) | StorageError::ChannelUnavailable(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors surfaced by the broker service boundary.
#[derive(Debug)]
pub enum BrokerError {
    /// Malformed request: empty channel key, empty payload, unknown offset
    /// kind, or a pull interval below one millisecond.
    InvalidArgument(&'static str),
    /// Subscribe was attempted on a channel that does not exist.
    NoSuchChannel(String),
    /// Required transport metadata (the remote address) was missing.
    FailedPrecondition(&'static str),
    /// The storage layer failed to persist the message.
    Internal(StorageError),
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::InvalidArgument(reason) => write!(f, "invalid argument: {reason}"),
            BrokerError::NoSuchChannel(channel) => {
                write!(f, "channel '{channel}' does not exist")
            }
            BrokerError::FailedPrecondition(reason) => {
                write!(f, "failed precondition: {reason}")
            }
            BrokerError::Internal(e) => write!(f, "internal error: {e}"),
        }
    }
}

impl std::error::Error for BrokerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BrokerError::Internal(e) => Some(e),
            _ => None,
        }
    }
}
