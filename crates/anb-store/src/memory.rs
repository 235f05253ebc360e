//! In-memory store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use anb_models::{Video, VideoId, VideoStatus};

use crate::error::{StoreError, StoreResult};
use crate::store::VideoStore;

#[derive(Debug, Default)]
struct Inner {
    videos: HashMap<VideoId, Video>,
    // Every status written per video, in order.
    history: HashMap<VideoId, Vec<VideoStatus>>,
    reject_status: Option<VideoStatus>,
}

/// Map-backed [`VideoStore`].
#[derive(Debug, Default)]
pub struct MemoryVideoStore {
    inner: RwLock<Inner>,
}

impl MemoryVideoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a record.
    pub async fn insert(&self, video: Video) {
        let mut inner = self.inner.write().await;
        inner.history.entry(video.id).or_default().push(video.status);
        inner.videos.insert(video.id, video);
    }

    /// Current record, if any.
    pub async fn get(&self, id: VideoId) -> Option<Video> {
        self.inner.read().await.videos.get(&id).cloned()
    }

    /// Statuses written for `id`, starting with the inserted one.
    pub async fn history(&self, id: VideoId) -> Vec<VideoStatus> {
        self.inner
            .read()
            .await
            .history
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    /// Fail every update that would write `status`.
    pub async fn reject_updates_with_status(&self, status: Option<VideoStatus>) {
        self.inner.write().await.reject_status = status;
    }
}

#[async_trait]
impl VideoStore for MemoryVideoStore {
    async fn find_by_id(&self, id: VideoId) -> StoreResult<Video> {
        self.get(id).await.ok_or(StoreError::NotFound(id))
    }

    async fn update(&self, video: &Video) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.reject_status == Some(video.status) {
            return Err(StoreError::Unavailable(format!(
                "rejected write of status {}",
                video.status
            )));
        }
        if !inner.videos.contains_key(&video.id) {
            return Err(StoreError::NotFound(video.id));
        }
        inner.history.entry(video.id).or_default().push(video.status);
        inner.videos.insert(video.id, video.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn video() -> Video {
        Video::new(VideoId::new(), Uuid::new_v4(), "Buzzer beater", "./storage/v.mp4")
    }

    #[tokio::test]
    async fn test_find_missing() {
        let store = MemoryVideoStore::new();
        let err = store.find_by_id(VideoId::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_records_history() {
        let store = MemoryVideoStore::new();
        let mut v = video();
        store.insert(v.clone()).await;

        v.start_processing().unwrap();
        store.update(&v).await.unwrap();

        assert_eq!(store.find_by_id(v.id).await.unwrap().status, VideoStatus::Processing);
        assert_eq!(
            store.history(v.id).await,
            vec![VideoStatus::Uploaded, VideoStatus::Processing]
        );
    }

    #[tokio::test]
    async fn test_rejected_status() {
        let store = MemoryVideoStore::new();
        let mut v = video();
        store.insert(v.clone()).await;
        store
            .reject_updates_with_status(Some(VideoStatus::Processing))
            .await;

        v.start_processing().unwrap();
        assert!(store.update(&v).await.is_err());
        assert_eq!(store.get(v.id).await.unwrap().status, VideoStatus::Uploaded);
    }

    #[tokio::test]
    async fn test_update_unknown_video() {
        let store = MemoryVideoStore::new();
        assert!(store.update(&video()).await.unwrap_err().is_not_found());
    }
}
