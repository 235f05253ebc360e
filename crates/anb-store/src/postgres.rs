//! Postgres adapter over the `videos` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, error, info};
use uuid::Uuid;

use anb_models::{Video, VideoId, VideoStatus};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::store::VideoStore;

const SELECT_VIDEO: &str = r#"
    SELECT id, user_id, title, original_url, processed_url, status,
           uploaded_at, processed_at, published_at,
           width_proc, height_proc, aspect_proc, has_audio_orig,
           watermark, is_public_for_vote
    FROM videos
    WHERE id = $1
"#;

const UPDATE_VIDEO: &str = r#"
    UPDATE videos
    SET status = $2,
        processed_url = $3,
        processed_at = $4,
        published_at = $5,
        width_proc = $6,
        height_proc = $7,
        aspect_proc = $8,
        has_audio_orig = $9,
        watermark = $10,
        is_public_for_vote = $11
    WHERE id = $1
"#;

#[derive(sqlx::FromRow)]
struct VideoRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    original_url: String,
    processed_url: Option<String>,
    status: String,
    uploaded_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    published_at: Option<DateTime<Utc>>,
    width_proc: Option<i32>,
    height_proc: Option<i32>,
    aspect_proc: Option<String>,
    has_audio_orig: Option<bool>,
    watermark: bool,
    is_public_for_vote: bool,
}

impl TryFrom<VideoRow> for Video {
    type Error = StoreError;

    fn try_from(row: VideoRow) -> Result<Self, Self::Error> {
        let id = VideoId::from(row.id);
        let status: VideoStatus = row.status.parse().map_err(|e| StoreError::Corrupt {
            id,
            message: format!("{e}"),
        })?;

        Ok(Video {
            id,
            user_id: row.user_id,
            title: row.title,
            original_url: row.original_url,
            processed_url: row.processed_url,
            status,
            uploaded_at: row.uploaded_at,
            processed_at: row.processed_at,
            published_at: row.published_at,
            width_proc: row.width_proc,
            height_proc: row.height_proc,
            aspect_proc: row.aspect_proc,
            has_audio_orig: row.has_audio_orig,
            watermark: row.watermark,
            is_public_for_vote: row.is_public_for_vote,
        })
    }
}

/// [`VideoStore`] backed by a Postgres pool.
#[derive(Clone)]
pub struct PgVideoStore {
    pool: PgPool,
}

impl PgVideoStore {
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        info!("Connecting to Postgres");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;
        info!("Connected to Postgres");
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VideoStore for PgVideoStore {
    async fn find_by_id(&self, id: VideoId) -> StoreResult<Video> {
        let row = sqlx::query_as::<_, VideoRow>(SELECT_VIDEO)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to load video {}: {}", id, e);
                StoreError::Database(e)
            })?;

        row.ok_or(StoreError::NotFound(id))?.try_into()
    }

    async fn update(&self, video: &Video) -> StoreResult<()> {
        let result = sqlx::query(UPDATE_VIDEO)
            .bind(video.id.0)
            .bind(video.status.as_str())
            .bind(video.processed_url.as_deref())
            .bind(video.processed_at)
            .bind(video.published_at)
            .bind(video.width_proc)
            .bind(video.height_proc)
            .bind(video.aspect_proc.as_deref())
            .bind(video.has_audio_orig)
            .bind(video.watermark)
            .bind(video.is_public_for_vote)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to update video {}: {}", video.id, e);
                StoreError::Database(e)
            })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(video.id));
        }

        debug!(video_id = %video.id, status = %video.status, "Video updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> VideoRow {
        VideoRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Crossover".to_string(),
            original_url: "./storage/c.mp4".to_string(),
            processed_url: None,
            status: status.to_string(),
            uploaded_at: Utc::now(),
            processed_at: None,
            published_at: None,
            width_proc: None,
            height_proc: None,
            aspect_proc: None,
            has_audio_orig: None,
            watermark: false,
            is_public_for_vote: false,
        }
    }

    #[test]
    fn test_row_conversion() {
        let video = Video::try_from(row("processing")).unwrap();
        assert_eq!(video.status, VideoStatus::Processing);
    }

    #[test]
    fn test_unknown_status_is_corrupt() {
        let err = Video::try_from(row("archived")).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    #[ignore = "requires Postgres"]
    async fn test_update_roundtrip() {
        let store = PgVideoStore::connect(&StoreConfig::from_env()).await.unwrap();
        let id: Uuid = std::env::var("TEST_VIDEO_ID").unwrap().parse().unwrap();

        let mut video = store.find_by_id(VideoId::from(id)).await.unwrap();
        video.start_processing().unwrap();
        store.update(&video).await.unwrap();

        let reloaded = store.find_by_id(video.id).await.unwrap();
        assert_eq!(reloaded.status, VideoStatus::Processing);
    }
}
