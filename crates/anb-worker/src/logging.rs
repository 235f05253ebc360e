//! Structured task logging.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use anb_queue::VideoProcessingTask;

/// Logs the lifecycle of one task with its video id and attempt attached.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    video_id: String,
    retry_count: u32,
    operation: &'static str,
}

impl TaskLogger {
    pub fn new(task: &VideoProcessingTask, operation: &'static str) -> Self {
        Self {
            video_id: task.video_id.to_string(),
            retry_count: task.retry_count,
            operation,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            video_id = %self.video_id,
            retry_count = self.retry_count,
            operation = self.operation,
            "Task started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            video_id = %self.video_id,
            retry_count = self.retry_count,
            operation = self.operation,
            "Task progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            video_id = %self.video_id,
            retry_count = self.retry_count,
            operation = self.operation,
            "Task warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            video_id = %self.video_id,
            retry_count = self.retry_count,
            operation = self.operation,
            "Task error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            video_id = %self.video_id,
            retry_count = self.retry_count,
            operation = self.operation,
            "Task completed: {}", message
        );
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// Span covering the whole task.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "task",
            video_id = %self.video_id,
            retry_count = self.retry_count,
            operation = self.operation
        )
    }
}

/// Install the global subscriber: JSON when `LOG_FORMAT=json`, ANSI text otherwise.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,rdkafka=warn"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anb_models::VideoId;
    use uuid::Uuid;

    #[test]
    fn test_task_logger_carries_task_identity() {
        let mut task = VideoProcessingTask::new(VideoId::new(), Uuid::new_v4(), "t", "/a.mp4");
        task.retry_count = 2;
        let logger = TaskLogger::new(&task, "video_processing");

        assert_eq!(logger.video_id(), task.video_id.to_string());
        assert_eq!(logger.retry_count, 2);
        assert_eq!(logger.operation, "video_processing");
    }
}
