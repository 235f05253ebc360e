//! FFmpeg CLI wrapper for the video transformation pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with multiple inputs
//! - A runner trait so stages can be driven without a real encoder
//! - Filter graph builders for normalize, watermark and concatenation
//! - Temporary artifacts that delete themselves when dropped
//! - The fixed four-stage [`VideoPipeline`]

pub mod artifact;
pub mod command;
pub mod error;
pub mod filters;
pub mod pipeline;
pub mod watermark;

pub use artifact::TempArtifact;
pub use command::{check_ffmpeg, CommandRunner, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use pipeline::{PipelineConfig, PipelineStage, TransformEngine, VideoPipeline};
pub use watermark::WatermarkConfig;
