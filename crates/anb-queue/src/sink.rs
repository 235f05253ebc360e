//! Outbound message port.

use async_trait::async_trait;

use crate::error::QueueResult;

/// A keyed message ready for the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl OutboundMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Delivers messages to the broker.
///
/// `send` resolves once the broker acknowledged the write; a failed
/// acknowledgement is an error.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> QueueResult<()>;
}
