//! Wire-level task records.

use anb_models::VideoId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QueueResult;

/// Request to run the processing pipeline for one video.
///
/// Only `retry_count` and `timestamp` ever change, and only when the task
/// is republished to the retry channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoProcessingTask {
    /// Video to process (also the message key)
    pub video_id: VideoId,
    /// Owner of the video
    pub user_id: Uuid,
    pub title: String,
    /// Location of the uploaded source file
    pub file_path: String,
    /// When this attempt was enqueued
    pub timestamp: DateTime<Utc>,
    /// Attempts already made
    #[serde(default)]
    pub retry_count: u32,
}

impl VideoProcessingTask {
    /// Create a first-attempt task.
    pub fn new(
        video_id: VideoId,
        user_id: Uuid,
        title: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            video_id,
            user_id,
            title: title.into(),
            file_path: file_path.into(),
            timestamp: Utc::now(),
            retry_count: 0,
        }
    }

    /// The same task for the following attempt.
    pub fn next_attempt(&self) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            timestamp: Utc::now(),
            ..self.clone()
        }
    }

    /// Message key: the video id, so one video always maps to one partition.
    pub fn key(&self) -> String {
        self.video_id.to_string()
    }

    pub fn to_json(&self) -> QueueResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(payload: &[u8]) -> QueueResult<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Dead-letter record: the task as last attempted, plus why it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterTask {
    #[serde(flatten)]
    pub task: VideoProcessingTask,
    /// Error text of the final attempt
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetterTask {
    pub fn new(task: VideoProcessingTask, error: impl Into<String>) -> Self {
        Self {
            task,
            error: error.into(),
            failed_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> QueueResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn task() -> VideoProcessingTask {
        VideoProcessingTask::new(
            VideoId::new(),
            Uuid::new_v4(),
            "Three pointer",
            "./storage/uploads/clip.mp4",
        )
    }

    #[test]
    fn test_wire_field_names() {
        let t = task();
        let json: Value = serde_json::from_slice(&t.to_json().unwrap()).unwrap();
        let obj = json.as_object().unwrap();

        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            ["file_path", "retry_count", "timestamp", "title", "user_id", "video_id"]
        );
        assert_eq!(obj["video_id"], Value::String(t.video_id.to_string()));
        assert_eq!(obj["retry_count"], Value::from(0));
        // RFC 3339
        let ts = obj["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn test_decode_producer_payload() {
        let payload = br#"{
            "video_id": "6f1c8b7e-0a7d-4a55-9d8e-2f3c9b1d7a10",
            "user_id": "0b5a3e36-3b8f-4c4f-a0b5-1f3d9c1e2a44",
            "title": "Alley-oop",
            "file_path": "./storage/uploads/a.mp4",
            "timestamp": "2025-10-01T12:00:00Z",
            "retry_count": 2
        }"#;
        let t = VideoProcessingTask::from_json(payload).unwrap();
        assert_eq!(t.retry_count, 2);
        assert_eq!(t.title, "Alley-oop");
        assert_eq!(t.key(), "6f1c8b7e-0a7d-4a55-9d8e-2f3c9b1d7a10");
    }

    #[test]
    fn test_malformed_payload_is_rejected() {
        assert!(VideoProcessingTask::from_json(b"not json").is_err());
        assert!(VideoProcessingTask::from_json(br#"{"video_id":"nope"}"#).is_err());
    }

    #[test]
    fn test_next_attempt_only_bumps_count_and_timestamp() {
        let mut t = task();
        t.timestamp = DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let next = t.next_attempt();

        assert_eq!(next.retry_count, 1);
        assert!(next.timestamp > t.timestamp);
        assert_eq!(
            VideoProcessingTask {
                retry_count: t.retry_count,
                timestamp: t.timestamp,
                ..next
            },
            t
        );
    }

    #[test]
    fn test_dead_letter_is_flat() {
        let dlq = DeadLetterTask::new(task(), "trim stage failed: boom");
        let json: Value = serde_json::from_slice(&dlq.to_json().unwrap()).unwrap();
        assert_eq!(json["error"], "trim stage failed: boom");
        assert!(json["failed_at"].is_string());
        assert!(json["video_id"].is_string());
        assert!(json.get("task").is_none());
    }
}
