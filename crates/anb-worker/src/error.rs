//! Worker error types.

use thiserror::Error;

use anb_models::{InvalidTransition, VideoId};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Video not found: {0}")]
    VideoNotFound(VideoId),

    #[error("Status transition rejected: {0}")]
    Transition(#[from] InvalidTransition),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Media error: {0}")]
    Media(#[from] anb_media::MediaError),

    #[error("Store error: {0}")]
    Store(#[from] anb_store::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] anb_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Retrying can never succeed: the task goes straight to dead-letter.
    pub fn is_fatal(&self) -> bool {
        match self {
            WorkerError::VideoNotFound(_) | WorkerError::Transition(_) => true,
            WorkerError::Store(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        !self.is_fatal() && !matches!(self, WorkerError::ConfigError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anb_media::{MediaError, PipelineStage};
    use anb_store::StoreError;

    #[test]
    fn test_classification() {
        let missing = WorkerError::VideoNotFound(VideoId::new());
        assert!(missing.is_fatal());
        assert!(!missing.is_retryable());

        let gone = WorkerError::from(StoreError::NotFound(VideoId::new()));
        assert!(gone.is_fatal());

        let stage = WorkerError::from(MediaError::stage_failed(
            PipelineStage::Trim,
            MediaError::Timeout(600),
        ));
        assert!(stage.is_retryable());
        assert_eq!(
            stage.to_string(),
            "Media error: trim stage failed: Operation timed out after 600 seconds"
        );

        let db = WorkerError::from(StoreError::Unavailable("connection reset".into()));
        assert!(db.is_retryable());
    }
}
