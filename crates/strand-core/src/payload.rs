//! Channel message payloads.
//!
//! Inbound text and binary frames are forwarded to the protocol processor
//! verbatim: no reframing, no decoding. Binary data rides on [`Bytes`] so
//! sub-slices share the same allocation.

use bytes::Bytes;

/// One inbound or outbound channel message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessagePayload {
    /// A text frame.
    Text(String),
    /// A binary frame.
    Binary(Bytes),
}

impl MessagePayload {
    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Binary(b) => b.len(),
        }
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The text content, if this is a text frame.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Binary(_) => None,
        }
    }

    /// The binary content, if this is a binary frame.
    #[must_use]
    pub fn as_binary(&self) -> Option<&Bytes> {
        match self {
            Self::Text(_) => None,
            Self::Binary(b) => Some(b),
        }
    }
}

impl From<String> for MessagePayload {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for MessagePayload {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<Bytes> for MessagePayload {
    fn from(b: Bytes) -> Self {
        Self::Binary(b)
    }
}

impl From<Vec<u8>> for MessagePayload {
    fn from(b: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(b))
    }
}
