//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::PipelineStage;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("{stage} stage failed: {source}")]
    StageFailed {
        stage: PipelineStage,
        #[source]
        source: Box<MediaError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Attribute an error to a pipeline stage.
    pub fn stage_failed(stage: PipelineStage, source: MediaError) -> Self {
        Self::StageFailed {
            stage,
            source: Box::new(source),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stage that produced this error, if any.
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            MediaError::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
