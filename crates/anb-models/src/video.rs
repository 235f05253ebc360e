//! Video entity and processing status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Output width produced by the normalize stage.
pub const PROCESSED_WIDTH: i32 = 1280;
/// Output height produced by the normalize stage.
pub const PROCESSED_HEIGHT: i32 = 720;
/// Output aspect ratio produced by the normalize stage.
pub const PROCESSED_ASPECT: &str = "16:9";
/// Audio is stripped during normalization.
pub const PROCESSED_HAS_AUDIO: bool = false;

/// Unique identifier of a video (the subject of a processing task).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(pub Uuid);

impl VideoId {
    /// Generate a new random video ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from the string form carried on the wire.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// File name of the processed artifact for this video.
    pub fn processed_file_name(&self) -> String {
        format!("{}_processed.mp4", self.0)
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for VideoId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Video processing status.
///
/// ```text
/// uploaded ──► processing ──► published
///                 ▲   │
///                 │   └─────► failed
///                 └────────────┘ (fresh attempt)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    /// Upload stored, waiting for a worker
    #[default]
    Uploaded,
    /// A worker is running the pipeline
    Processing,
    /// Pipeline succeeded, video is public
    Published,
    /// Last attempt failed
    Failed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Uploaded => "uploaded",
            VideoStatus::Processing => "processing",
            VideoStatus::Published => "published",
            VideoStatus::Failed => "failed",
        }
    }

    /// Whether the status machine allows moving from `self` to `next`.
    ///
    /// Terminal states are only reachable from `Processing`. `Failed` and
    /// `Published` may re-enter `Processing` so retried and redelivered
    /// tasks can run again.
    pub fn can_transition_to(&self, next: VideoStatus) -> bool {
        use VideoStatus::*;
        matches!(
            (self, next),
            (Uploaded, Processing)
                | (Processing, Processing)
                | (Processing, Published)
                | (Processing, Failed)
                | (Failed, Processing)
                | (Published, Processing)
        )
    }

    /// Check if this is a terminal state for the current attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, VideoStatus::Published | VideoStatus::Failed)
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VideoStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(VideoStatus::Uploaded),
            "processing" => Ok(VideoStatus::Processing),
            // Older rows written before the published/processed rename.
            "published" | "processed" => Ok(VideoStatus::Published),
            "failed" => Ok(VideoStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Status string that does not map to a [`VideoStatus`].
#[derive(Debug, Clone, Error)]
#[error("unknown video status: {0}")]
pub struct UnknownStatus(pub String);

/// Rejected status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid status transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: VideoStatus,
    pub to: VideoStatus,
}

/// Derived attributes of a successfully processed video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedOutput {
    /// Public URL of the processed artifact
    pub processed_url: String,
    pub width: i32,
    pub height: i32,
    pub aspect: String,
    pub has_audio: bool,
}

impl ProcessedOutput {
    /// Output attributes of the fixed pipeline (720p, 16:9, no audio).
    pub fn standard(processed_url: impl Into<String>) -> Self {
        Self {
            processed_url: processed_url.into(),
            width: PROCESSED_WIDTH,
            height: PROCESSED_HEIGHT,
            aspect: PROCESSED_ASPECT.to_string(),
            has_audio: PROCESSED_HAS_AUDIO,
        }
    }
}

/// Persisted video record mutated by the processing worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: VideoId,
    /// Owner
    pub user_id: Uuid,
    pub title: String,
    /// Location of the uploaded source file
    pub original_url: String,
    /// Public URL, set once processing succeeds
    pub processed_url: Option<String>,
    #[serde(default)]
    pub status: VideoStatus,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub width_proc: Option<i32>,
    pub height_proc: Option<i32>,
    pub aspect_proc: Option<String>,
    pub has_audio_orig: Option<bool>,
    #[serde(default)]
    pub watermark: bool,
    #[serde(default)]
    pub is_public_for_vote: bool,
}

impl Video {
    /// Create a freshly uploaded video record.
    pub fn new(
        id: VideoId,
        user_id: Uuid,
        title: impl Into<String>,
        original_url: impl Into<String>,
    ) -> Self {
        Self {
            id,
            user_id,
            title: title.into(),
            original_url: original_url.into(),
            processed_url: None,
            status: VideoStatus::Uploaded,
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

    fn transition(&mut self, next: VideoStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Move to `processing` at the start of an attempt.
    pub fn start_processing(&mut self) -> Result<(), InvalidTransition> {
        self.transition(VideoStatus::Processing)
    }

    /// Record a failed attempt.
    ///
    /// A failed video is never public: a redelivered task that fails on an
    /// already published video withdraws it from voting.
    pub fn mark_failed(&mut self) -> Result<(), InvalidTransition> {
        self.transition(VideoStatus::Failed)?;
        self.processed_url = None;
        self.published_at = None;
        self.is_public_for_vote = false;
        Ok(())
    }

    /// Record a successful attempt and make the video public.
    pub fn publish(
        &mut self,
        output: ProcessedOutput,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        self.transition(VideoStatus::Published)?;
        self.processed_url = Some(output.processed_url);
        self.processed_at = Some(now);
        self.published_at = Some(now);
        self.is_public_for_vote = true;
        self.watermark = true;
        self.width_proc = Some(output.width);
        self.height_proc = Some(output.height);
        self.aspect_proc = Some(output.aspect);
        self.has_audio_orig = Some(output.has_audio);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uploaded() -> Video {
        Video::new(VideoId::new(), Uuid::new_v4(), "Dunk contest", "./storage/in.mp4")
    }

    #[test]
    fn test_video_id_generation() {
        let id1 = VideoId::new();
        let id2 = VideoId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_processed_file_name() {
        let id = VideoId::parse("6f1c8b7e-0a7d-4a55-9d8e-2f3c9b1d7a10").unwrap();
        assert_eq!(
            id.processed_file_name(),
            "6f1c8b7e-0a7d-4a55-9d8e-2f3c9b1d7a10_processed.mp4"
        );
    }

    #[test]
    fn test_terminal_states_require_processing() {
        assert!(!VideoStatus::Uploaded.can_transition_to(VideoStatus::Published));
        assert!(!VideoStatus::Uploaded.can_transition_to(VideoStatus::Failed));
        assert!(!VideoStatus::Failed.can_transition_to(VideoStatus::Published));
        assert!(!VideoStatus::Published.can_transition_to(VideoStatus::Failed));
        assert!(!VideoStatus::Processing.can_transition_to(VideoStatus::Uploaded));
    }

    #[test]
    fn test_failed_video_gets_fresh_attempt() {
        let mut video = uploaded();
        video.start_processing().unwrap();
        video.mark_failed().unwrap();
        assert!(video.start_processing().is_ok());
        assert_eq!(video.status, VideoStatus::Processing);
    }

    #[test]
    fn test_failed_rerun_withdraws_publication() {
        let mut video = uploaded();
        video.start_processing().unwrap();
        video
            .publish(ProcessedOutput::standard("/storage/x_processed.mp4"), Utc::now())
            .unwrap();

        video.start_processing().unwrap();
        video.mark_failed().unwrap();

        assert_eq!(video.status, VideoStatus::Failed);
        assert!(video.processed_url.is_none());
        assert!(video.published_at.is_none());
        assert!(!video.is_public_for_vote);
    }

    #[test]
    fn test_publish_from_uploaded_is_rejected() {
        let mut video = uploaded();
        let err = video
            .publish(ProcessedOutput::standard("/storage/x.mp4"), Utc::now())
            .unwrap_err();
        assert_eq!(err.from, VideoStatus::Uploaded);
        assert_eq!(err.to, VideoStatus::Published);
        assert!(video.processed_url.is_none());
    }

    #[test]
    fn test_publish_sets_derived_fields() {
        let mut video = uploaded();
        let now = Utc::now();
        video.start_processing().unwrap();
        video
            .publish(ProcessedOutput::standard("/storage/x_processed.mp4"), now)
            .unwrap();

        assert_eq!(video.status, VideoStatus::Published);
        assert_eq!(video.processed_url.as_deref(), Some("/storage/x_processed.mp4"));
        assert_eq!(video.processed_at, Some(now));
        assert_eq!(video.published_at, Some(now));
        assert!(video.is_public_for_vote);
        assert!(video.watermark);
        assert_eq!(video.width_proc, Some(1280));
        assert_eq!(video.height_proc, Some(720));
        assert_eq!(video.aspect_proc.as_deref(), Some("16:9"));
        assert_eq!(video.has_audio_orig, Some(false));
    }

    #[test]
    fn test_status_parse_accepts_legacy_processed() {
        assert_eq!("processed".parse::<VideoStatus>().unwrap(), VideoStatus::Published);
        assert!("archived".parse::<VideoStatus>().is_err());
    }
}
