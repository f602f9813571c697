//! Data channel message type

use bytes::Bytes;

/// Maximum message size (16 MiB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Message received from or sent to the master over a data channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataChannelMessage {
    /// UTF-8 text message
    Text(String),
    /// Binary message
    Binary(Bytes),
}

impl DataChannelMessage {
    /// Build a message from a raw payload and its string flag
    ///
    /// Payloads flagged as text that are not valid UTF-8 are kept as binary.
    pub fn from_payload(data: Bytes, is_string: bool) -> Self {
        if is_string {
            match String::from_utf8(data.to_vec()) {
                Ok(text) => return DataChannelMessage::Text(text),
                Err(_) => return DataChannelMessage::Binary(data),
            }
        }
        DataChannelMessage::Binary(data)
    }

    /// Text content, if this is a text message
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DataChannelMessage::Text(text) => Some(text),
            DataChannelMessage::Binary(_) => None,
        }
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        match self {
            DataChannelMessage::Text(text) => text.len(),
            DataChannelMessage::Binary(data) => data.len(),
        }
    }

    /// Check if message exceeds maximum size
    pub fn exceeds_max_size(&self) -> bool {
        self.size() > MAX_MESSAGE_SIZE
    }
}
