//! Per-message processing.
//!
//! Decode, wait out the retry backoff, run the task, then decide between
//! acknowledging, republishing to retry and forwarding to dead-letter.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use anb_queue::{Channel, Delivery, TaskProducer, VideoProcessingTask};

use crate::backoff::Backoff;
use crate::lifecycle::TaskProcessor;
use crate::metrics;
use crate::retry::{retry_async, RetryConfig};

/// What happened to a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Task succeeded
    Completed,
    /// Task failed and was republished with this attempt count
    Retried { retry_count: u32 },
    /// Task was forwarded to the dead-letter channel
    DeadLettered,
    /// Payload could not be decoded and was dropped
    Malformed,
    /// Shutdown arrived during the backoff wait
    Interrupted,
    /// Retry or dead-letter publish failed; the message must be redelivered
    PublishFailed,
}

impl Disposition {
    /// Whether the delivery's offset may be committed.
    pub fn should_ack(&self) -> bool {
        !matches!(self, Disposition::Interrupted | Disposition::PublishFailed)
    }
}

/// Applies the retry policy around a [`TaskProcessor`].
pub struct TaskHandler {
    processor: Arc<dyn TaskProcessor>,
    producer: TaskProducer,
    backoff: Backoff,
    max_retries: u32,
    publish_retry: RetryConfig,
}

impl TaskHandler {
    pub fn new(
        processor: Arc<dyn TaskProcessor>,
        producer: TaskProducer,
        backoff: Backoff,
        max_retries: u32,
    ) -> Self {
        Self {
            processor,
            producer,
            backoff,
            max_retries,
            publish_retry: RetryConfig::new("republish"),
        }
    }

    /// Override how republish and dead-letter sends are retried.
    pub fn with_publish_retry(mut self, config: RetryConfig) -> Self {
        self.publish_retry = config;
        self
    }

    pub async fn handle(&self, delivery: &Delivery, shutdown: &mut watch::Receiver<bool>) -> Disposition {
        metrics::record_consumed(&delivery.topic);

        let task = match VideoProcessingTask::from_json(&delivery.payload) {
            Ok(task) => task,
            Err(e) => {
                warn!(
                    topic = %delivery.topic,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    "Dropping malformed task: {}",
                    e
                );
                metrics::record_malformed();
                return Disposition::Malformed;
            }
        };

        if delivery.channel() == Some(Channel::Retry) && task.retry_count > 0 {
            let delay = self.backoff.delay(task.retry_count);
            debug!(
                video_id = %task.video_id,
                retry_count = task.retry_count,
                "Backing off {:?} before retry",
                delay
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_requested(shutdown) => {
                    info!(video_id = %task.video_id, "Shutdown during backoff, leaving task for redelivery");
                    return Disposition::Interrupted;
                }
            }
        }

        let started = Instant::now();
        match self.processor.process_task(&task).await {
            Ok(()) => {
                metrics::record_completed(started.elapsed());
                Disposition::Completed
            }
            Err(e) => {
                metrics::record_failed(started.elapsed());
                let reason = e.to_string();

                if e.is_fatal() || task.retry_count >= self.max_retries {
                    self.dead_letter(&task, &reason).await
                } else {
                    self.retry(&task).await
                }
            }
        }
    }

    async fn retry(&self, task: &VideoProcessingTask) -> Disposition {
        let producer = &self.producer;
        match retry_async(&self.publish_retry, || producer.publish_retry(task)).await {
            Ok(next) => {
                info!(
                    video_id = %task.video_id,
                    "Retrying video (attempt {}/{})",
                    next.retry_count,
                    self.max_retries
                );
                metrics::record_retried();
                Disposition::Retried {
                    retry_count: next.retry_count,
                }
            }
            Err(e) => {
                error!(video_id = %task.video_id, "Failed to publish retry: {}", e);
                Disposition::PublishFailed
            }
        }
    }

    async fn dead_letter(&self, task: &VideoProcessingTask, reason: &str) -> Disposition {
        let producer = &self.producer;
        match retry_async(&self.publish_retry, || producer.publish_dead_letter(task, reason)).await {
            Ok(()) => {
                metrics::record_dead_lettered();
                Disposition::DeadLettered
            }
            Err(e) => {
                error!(video_id = %task.video_id, "Failed to publish dead letter: {}", e);
                Disposition::PublishFailed
            }
        }
    }
}

/// Resolves once shutdown is requested. Never resolves if the sender is gone.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
