use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

/// A single immutable record appended to exactly one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Globally unique identifier, assigned by the broker's [`Generator`].
    pub id: String,

    /// Opaque payload bytes.
    pub content: Vec<u8>,

    /// Seconds since the Unix epoch at publish time. Best-effort monotonic;
    /// not required for correctness.
    pub created_at: i64,
}

/// Identity of one active subscribe session.
///
/// A subscriber is ephemeral: created when the subscribe stream opens and
/// destroyed when it closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    /// Unique per session.
    pub id: String,

    /// Remote address captured from the transport.
    pub remote_addr: String,
}

/// Where a new subscription starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOffset {
    /// Deliver the full channel history, then follow the tail.
    Beginning,

    /// Skip everything currently in the channel; deliver only messages
    /// appended after registration.
    Latest,
}

/// Injected capability for ID generation and timestamp sourcing.
///
/// The broker never mints identifiers or reads the clock directly, so tests
/// can substitute a deterministic implementation.
pub trait Generator: Send + Sync {
    /// Returns a new globally unique message ID.
    fn message_id(&self) -> String;

    /// Returns a new subscriber ID, unique per session.
    fn subscriber_id(&self) -> String;

    /// Returns the current time as seconds since the Unix epoch.
    fn timestamp(&self) -> i64;
}

/// Default [`Generator`] backed by UUIDv4 and the system clock.
#[derive(Debug, Default)]
pub struct SystemGenerator;

impl Generator for SystemGenerator {
    fn message_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    fn subscriber_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    fn timestamp(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_secs() as i64,
            // Clock set before the epoch.
            Err(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_generator_ids_are_unique() {
        let generator = SystemGenerator;

        let a = generator.message_id();
        let b = generator.message_id();
        assert_ne!(a, b);

        let s1 = generator.subscriber_id();
        let s2 = generator.subscriber_id();
        assert_ne!(s1, s2);
    }

    #[test]
    fn test_system_generator_timestamp_is_positive() {
        let generator = SystemGenerator;
        assert!(generator.timestamp() > 0);
    }
}
