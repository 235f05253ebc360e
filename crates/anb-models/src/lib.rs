//! Shared data models for the ANB video processing core.
//!
//! This crate provides Serde-serializable types for:
//! - Video entities and their processing status
//! - Fixed attributes of processed output
//! - Encoding configuration used by the transformation pipeline

pub mod encoding;
pub mod video;

// Re-export common types
pub use encoding::EncodingConfig;
pub use video::{
    InvalidTransition, ProcessedOutput, UnknownStatus, Video, VideoId, VideoStatus, PROCESSED_ASPECT,
    PROCESSED_HAS_AUDIO, PROCESSED_HEIGHT, PROCESSED_WIDTH,
};
