//! Message payload delivered by the transport to a watcher.

/// One message received on a monitored stream.
///
/// The harness is agnostic to the payload format; validation hooks interpret
/// the bytes as they see fit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedMessage {
    /// Raw message payload.
    pub payload: Vec<u8>,
}

impl FeedMessage {
    /// Wrap a raw payload.
    #[must_use]
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl From<Vec<u8>> for FeedMessage {
    fn from(payload: Vec<u8>) -> Self {
        Self::new(payload)
    }
}

impl From<&[u8]> for FeedMessage {
    fn from(payload: &[u8]) -> Self {
        Self::new(payload.to_vec())
    }
}

impl From<&str> for FeedMessage {
    fn from(text: &str) -> Self {
        Self::new(text.as_bytes().to_vec())
    }
}
