//! Task producer.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::QueueResult;
use crate::sink::{MessageSink, OutboundMessage};
use crate::task::{DeadLetterTask, VideoProcessingTask};
use crate::topics::Channel;

/// Header carrying a unique id per published message.
pub const TASK_ID_HEADER: &str = "task_id";
/// Header carrying the publish time (RFC 3339).
pub const TIMESTAMP_HEADER: &str = "timestamp";

/// Publishes tasks to the three channels, keyed by video id.
///
/// The producer does not retry and does not compensate: a failed
/// delivery acknowledgement is returned to the caller.
#[derive(Clone)]
pub struct TaskProducer {
    sink: Arc<dyn MessageSink>,
}

impl TaskProducer {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self { sink }
    }

    /// Publish a fresh task to the primary channel.
    pub async fn publish(&self, task: &VideoProcessingTask) -> QueueResult<()> {
        self.send(Channel::Primary, task.key(), task.to_json()?).await?;
        info!(
            video_id = %task.video_id,
            "Published processing task to {}",
            Channel::Primary
        );
        Ok(())
    }

    /// Publish the next attempt of `task` to the retry channel.
    ///
    /// Returns the task as published, with `retry_count` incremented and a
    /// fresh timestamp.
    pub async fn publish_retry(&self, task: &VideoProcessingTask) -> QueueResult<VideoProcessingTask> {
        let next = task.next_attempt();
        self.send(Channel::Retry, next.key(), next.to_json()?).await?;
        info!(
            video_id = %next.video_id,
            retry_count = next.retry_count,
            "Published task to {}",
            Channel::Retry
        );
        Ok(next)
    }

    /// Wrap `task` with `error` and publish it to the dead-letter channel.
    pub async fn publish_dead_letter(&self, task: &VideoProcessingTask, error: &str) -> QueueResult<()> {
        let record = DeadLetterTask::new(task.clone(), error);
        self.send(Channel::DeadLetter, task.key(), record.to_json()?)
            .await?;
        warn!(
            video_id = %task.video_id,
            retry_count = task.retry_count,
            error = %error,
            "Task moved to {}",
            Channel::DeadLetter
        );
        Ok(())
    }

    async fn send(&self, channel: Channel, key: String, payload: Vec<u8>) -> QueueResult<()> {
        let message = OutboundMessage {
            topic: channel.topic().to_string(),
            key,
            payload,
            headers: vec![
                (TASK_ID_HEADER.to_string(), Uuid::new_v4().to_string()),
                (TIMESTAMP_HEADER.to_string(), Utc::now().to_rfc3339()),
            ],
        };
        debug!(topic = %message.topic, key = %message.key, "Sending message");
        self.sink.send(message).await
    }
}
