//! Fixed four-stage transformation pipeline.
//!
//! ```text
//! source ─► trim ─► normalize ─► watermark ─► concatenate(intro, main, outro) ─► output
//! ```
//!
//! Every stage reads the previous stage's artifact and writes a new one.
//! Intermediates live in [`TempArtifact`] guards, so they are gone by the
//! time [`VideoPipeline::transform`] returns, whatever the outcome.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use metrics::histogram;
use tracing::{debug, info};

use anb_models::EncodingConfig;

use crate::artifact::TempArtifact;
use crate::command::{CommandRunner, FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::{concat_filter, normalize_filter, CONCAT_OUTPUT_LABEL};
use crate::watermark::WatermarkConfig;

/// Stage latency histogram, labelled by `stage`.
pub const STAGE_LATENCY_METRIC: &str = "pipeline_stage_seconds";

/// Maximum duration kept from the start of the source (seconds).
pub const MAX_DURATION_SECS: u32 = 30;
/// Target frame width.
pub const TARGET_WIDTH: u32 = 1280;
/// Target frame height.
pub const TARGET_HEIGHT: u32 = 720;

/// Stages of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Trim,
    Normalize,
    Watermark,
    Concatenate,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 4] = [
        PipelineStage::Trim,
        PipelineStage::Normalize,
        PipelineStage::Watermark,
        PipelineStage::Concatenate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Trim => "trim",
            PipelineStage::Normalize => "normalize",
            PipelineStage::Watermark => "watermark",
            PipelineStage::Concatenate => "concatenate",
        }
    }

    /// Prefix of the intermediate file written by this stage.
    fn artifact_prefix(&self) -> &'static str {
        match self {
            PipelineStage::Trim => "cut",
            PipelineStage::Normalize => "resized",
            PipelineStage::Watermark => "watermarked",
            PipelineStage::Concatenate => "final",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory for intermediate artifacts
    pub temp_dir: PathBuf,
    /// Trim length (seconds)
    pub max_duration_secs: u32,
    /// Output frame width
    pub width: u32,
    /// Output frame height
    pub height: u32,
    /// Re-encoding settings (codec, CRF, preset, frame rate)
    pub encoding: EncodingConfig,
    /// Logo overlay
    pub watermark: WatermarkConfig,
    /// Clip prepended to every video
    pub intro_path: PathBuf,
    /// Clip appended to every video
    pub outro_path: PathBuf,
}

impl PipelineConfig {
    /// Standard 30 s / 720p pipeline with `logo.png`, `intro.mp4` and
    /// `outro.mp4` taken from `assets_dir`.
    pub fn new(temp_dir: impl Into<PathBuf>, assets_dir: impl AsRef<Path>) -> Self {
        let assets_dir = assets_dir.as_ref();
        Self {
            temp_dir: temp_dir.into(),
            max_duration_secs: MAX_DURATION_SECS,
            width: TARGET_WIDTH,
            height: TARGET_HEIGHT,
            encoding: EncodingConfig::default(),
            watermark: WatermarkConfig::from_assets_dir(assets_dir),
            intro_path: assets_dir.join("intro.mp4"),
            outro_path: assets_dir.join("outro.mp4"),
        }
    }
}

/// Media transformation capability used by the worker.
#[async_trait]
pub trait TransformEngine: Send + Sync {
    /// Transform `input` into the publishable video at `output`.
    async fn transform(&self, input: &Path, output: &Path) -> MediaResult<()>;
}

/// The fixed trim → normalize → watermark → concatenate pipeline.
pub struct VideoPipeline<R = FfmpegRunner> {
    config: PipelineConfig,
    runner: R,
}

impl VideoPipeline<FfmpegRunner> {
    /// Pipeline backed by the `ffmpeg` binary.
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_runner(config, FfmpegRunner::new())
    }
}

impl<R: CommandRunner> VideoPipeline<R> {
    /// Pipeline backed by a custom command runner.
    pub fn with_runner(config: PipelineConfig, runner: R) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Cut the source to the first `max_duration_secs`, copying streams.
    pub fn trim_command(&self, input: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(input, output)
            .duration(self.config.max_duration_secs)
            .stream_copy()
            .output_args(["-avoid_negative_ts", "make_zero"])
    }

    /// Letterbox to the target size, force the frame rate, drop audio.
    pub fn normalize_command(&self, input: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(input, output)
            .video_filter(normalize_filter(self.config.width, self.config.height))
            .output_args(self.config.encoding.to_ffmpeg_args())
            .frame_rate(self.config.encoding.frame_rate)
            .output_args(["-vsync", "cfr"])
            .no_audio()
    }

    /// Overlay the logo at the bottom-right corner.
    pub fn watermark_command(&self, input: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(input, output)
            .input(&self.config.watermark.image_path)
            .filter_complex(self.config.watermark.overlay_filter())
            .output_args(self.config.encoding.to_ffmpeg_args())
            .no_audio()
    }

    /// Join intro, main clip and outro through a concat filter graph.
    pub fn concatenate_command(&self, main: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(&self.config.intro_path, output)
            .input(main)
            .input(&self.config.outro_path)
            .filter_complex(concat_filter(
                3,
                self.config.width,
                self.config.height,
                self.config.encoding.frame_rate,
            ))
            .map(CONCAT_OUTPUT_LABEL)
            .output_args(self.config.encoding.to_ffmpeg_args())
            .frame_rate(self.config.encoding.frame_rate)
            .no_audio()
    }

    async fn trim(&self, input: &Path, output: &Path) -> MediaResult<()> {
        require_file(input)?;
        info!("Cutting video to {} seconds", self.config.max_duration_secs);
        self.runner.run(&self.trim_command(input, output)).await
    }

    async fn normalize(&self, input: &Path, output: &Path) -> MediaResult<()> {
        require_file(input)?;
        info!(
            "Resizing to {}x{} and removing audio",
            self.config.width, self.config.height
        );
        self.runner.run(&self.normalize_command(input, output)).await
    }

    async fn watermark(&self, input: &Path, output: &Path) -> MediaResult<()> {
        require_file(input)?;
        self.config.watermark.validate()?;
        info!("Adding watermark: {}", self.config.watermark.image_path.display());
        self.runner.run(&self.watermark_command(input, output)).await
    }

    async fn concatenate(&self, main: &Path, output: &Path) -> MediaResult<()> {
        for path in [self.config.intro_path.as_path(), main, self.config.outro_path.as_path()] {
            require_file(path)?;
        }
        info!("Concatenating intro + main + outro videos");
        self.runner.run(&self.concatenate_command(main, output)).await
    }

    /// Run one stage, timing it and tagging any error with the stage.
    async fn run_stage<F>(&self, stage: PipelineStage, fut: F) -> MediaResult<()>
    where
        F: std::future::Future<Output = MediaResult<()>>,
    {
        let started = Instant::now();
        let result = fut.await;
        let elapsed = started.elapsed();

        histogram!(STAGE_LATENCY_METRIC, "stage" => stage.as_str()).record(elapsed.as_secs_f64());
        debug!(stage = %stage, elapsed_ms = elapsed.as_millis() as u64, "Stage finished");

        result.map_err(|e| MediaError::stage_failed(stage, e))
    }
}

#[async_trait]
impl<R: CommandRunner> TransformEngine for VideoPipeline<R> {
    async fn transform(&self, input: &Path, output: &Path) -> MediaResult<()> {
        info!(
            "Starting video processing: {} -> {}",
            input.display(),
            output.display()
        );

        tokio::fs::create_dir_all(&self.config.temp_dir)
            .await
            .map_err(|e| {
                MediaError::internal(format!(
                    "failed to create temp directory {}: {}",
                    self.config.temp_dir.display(),
                    e
                ))
            })?;

        let cut = self.artifact(PipelineStage::Trim);
        self.run_stage(PipelineStage::Trim, self.trim(input, cut.path()))
            .await?;

        let resized = self.artifact(PipelineStage::Normalize);
        self.run_stage(
            PipelineStage::Normalize,
            self.normalize(cut.path(), resized.path()),
        )
        .await?;
        drop(cut);

        let watermarked = self.artifact(PipelineStage::Watermark);
        self.run_stage(
            PipelineStage::Watermark,
            self.watermark(resized.path(), watermarked.path()),
        )
        .await?;
        drop(resized);

        // Staged beside the destination so the final rename stays on one
        // filesystem. An existing output is only replaced by a complete one.
        let output_dir = match output.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let staged = TempArtifact::new(output_dir, PipelineStage::Concatenate.artifact_prefix());
        self.run_stage(
            PipelineStage::Concatenate,
            self.concatenate(watermarked.path(), staged.path()),
        )
        .await?;

        tokio::fs::rename(staged.path(), output).await?;
        staged.keep();
        info!("Video processing completed successfully: {}", output.display());
        Ok(())
    }
}

impl<R> VideoPipeline<R> {
    fn artifact(&self, stage: PipelineStage) -> TempArtifact {
        TempArtifact::new(&self.config.temp_dir, stage.artifact_prefix())
    }
}

fn require_file(path: &Path) -> MediaResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(MediaError::FileNotFound(path.to_path_buf()))
    }
}
