//! The persistence port.

use async_trait::async_trait;

use anb_models::{Video, VideoId};

use crate::error::StoreResult;

/// Loads and saves video records.
#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Load a video. Missing records are [`StoreError::NotFound`](crate::StoreError::NotFound).
    async fn find_by_id(&self, id: VideoId) -> StoreResult<Video>;

    /// Persist status and processing fields of an existing video.
    async fn update(&self, video: &Video) -> StoreResult<()>;
}
