use std::io;

use crate::message::Message;

/// A single entry in the write-ahead log.
///
/// Each entry records one `(channel, message)` tuple that has been durably
/// appended to the WAL but may not yet be reflected in a live channel log
/// (only relevant during replay).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    /// Key of the channel the message was published to.
    pub channel: String,

    /// The published message.
    pub message: Message,
}

impl WalEntry {
    pub fn new(channel: String, message: Message) -> Self {
        Self { channel, message }
    }

    /// Serializes the entry to bytes.
    ///
    /// Format (all integers little-endian):
    /// - channel_len: u32
    /// - channel: [u8; channel_len]
    /// - id_len: u32
    /// - id: [u8; id_len]
    /// - content_len: u32
    /// - content: [u8; content_len]
    /// - created_at: i64
    pub fn to_bytes(&self) -> Vec<u8> {
        let channel = self.channel.as_bytes();
        let id = self.message.id.as_bytes();
        let content = &self.message.content;

        let mut buf = Vec::with_capacity(4 + channel.len() + 4 + id.len() + 4 + content.len() + 8);

        buf.extend_from_slice(&(channel.len() as u32).to_le_bytes());
        buf.extend_from_slice(channel);

        buf.extend_from_slice(&(id.len() as u32).to_le_bytes());
        buf.extend_from_slice(id);

        buf.extend_from_slice(&(content.len() as u32).to_le_bytes());
        buf.extend_from_slice(content);

        buf.extend_from_slice(&self.message.created_at.to_le_bytes());

        buf
    }

    /// Deserializes an entry from bytes.
    ///
    /// Returns the entry and the number of bytes consumed.
    pub fn from_bytes(data: &[u8]) -> io::Result<(Self, usize)> {
        let mut offset = 0;

        let channel_bytes = read_chunk(data, &mut offset, "channel")?;
        let channel = String::from_utf8(channel_bytes.to_vec()).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("invalid UTF-8: {e}"))
        })?;

        let id_bytes = read_chunk(data, &mut offset, "message id")?;
        let id = String::from_utf8(id_bytes.to_vec()).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("invalid UTF-8: {e}"))
        })?;

        let content = read_chunk(data, &mut offset, "content")?.to_vec();

        if data.len() < offset + 8 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "truncated created_at",
            ));
        }
        let created_at = i64::from_le_bytes(data[offset..offset + 8].try_into().unwrap());
        offset += 8;

        Ok((
            Self {
                channel,
                message: Message {
                    id,
                    content,
                    created_at,
                },
            },
            offset,
        ))
    }
}

/// Reads one `u32`-length-prefixed field, advancing `offset`.
fn read_chunk<'a>(data: &'a [u8], offset: &mut usize, field: &str) -> io::Result<&'a [u8]> {
    if data.len() < *offset + 4 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("truncated {field} length"),
        ));
    }
    let len = u32::from_le_bytes(data[*offset..*offset + 4].try_into().unwrap()) as usize;
    *offset += 4;

    if data.len() < *offset + len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("truncated {field}"),
        ));
    }
    let chunk = &data[*offset..*offset + len];
    *offset += len;

    Ok(chunk)
}
