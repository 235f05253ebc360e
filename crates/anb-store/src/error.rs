//! Store error types.

use anb_models::VideoId;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Video not found: {0}")]
    NotFound(VideoId),

    #[error("Corrupt record for video {id}: {message}")]
    Corrupt { id: VideoId, message: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
