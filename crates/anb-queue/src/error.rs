//! Queue error types.

use thiserror::Error;

use crate::state::ConsumerState;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Publish to {topic} failed: {message}")]
    PublishFailed { topic: String, message: String },

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Offset store failed for {topic}/{partition}@{offset}: {message}")]
    AckFailed {
        topic: String,
        partition: i32,
        offset: i64,
        message: String,
    },

    #[error("Commit failed: {0}")]
    CommitFailed(String),

    #[error("Invalid consumer state transition {from:?} -> {to:?}")]
    InvalidState { from: ConsumerState, to: ConsumerState },

    #[error("Consumer closed")]
    Closed,

    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn publish_failed(topic: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::PublishFailed {
            topic: topic.into(),
            message: msg.into(),
        }
    }

    pub fn receive_failed(msg: impl Into<String>) -> Self {
        Self::ReceiveFailed(msg.into())
    }
}
