//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Stderr lines kept in a failure message.
const STDERR_TAIL_LINES: usize = 20;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file paths, in `-i` order
    inputs: Vec<PathBuf>,
    /// Output file path
    output: PathBuf,
    /// Input arguments (before the first -i)
    input_args: Vec<String>,
    /// Output arguments (after the last -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            inputs: vec![input.as_ref().to_path_buf()],
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add another input file.
    pub fn input(mut self, input: impl AsRef<Path>) -> Self {
        self.inputs.push(input.as_ref().to_path_buf());
        self
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Limit output duration.
    pub fn duration(self, seconds: u32) -> Self {
        self.output_arg("-t").output_arg(seconds.to_string())
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set filter complex.
    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Map a filter graph label or stream to the output.
    pub fn map(self, label: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(label)
    }

    /// Copy all streams without re-encoding.
    pub fn stream_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Force output frame rate.
    pub fn frame_rate(self, fps: u32) -> Self {
        self.output_arg("-r").output_arg(fps.to_string())
    }

    /// Drop audio streams.
    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Input paths in order.
    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    /// Output path.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-hide_banner".to_string());
        args.push("-v".to_string());
        args.push(self.log_level.clone());

        args.extend(self.input_args.iter().cloned());

        for input in &self.inputs {
            args.push("-i".to_string());
            args.push(input.to_string_lossy().to_string());
        }

        args.extend(self.output_args.iter().cloned());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Executes encoder commands.
///
/// The pipeline only talks to this trait, so tests can script stage
/// outcomes without an encoder installed.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()>;
}

/// Runner that spawns the `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    /// Binary to execute
    binary: PathBuf,
    /// Per-command timeout
    timeout: Option<Duration>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    /// Create a runner that resolves `ffmpeg` from PATH at spawn time.
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
            timeout: None,
        }
    }

    /// Create a runner bound to the `ffmpeg` found in PATH now.
    pub fn locate() -> MediaResult<Self> {
        Ok(Self {
            binary: check_ffmpeg()?,
            timeout: None,
        })
    }

    /// Set timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl CommandRunner for FfmpegRunner {
    async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        let args = cmd.build_args();
        debug!("Running FFmpeg: {} {}", self.binary.display(), args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => MediaError::FfmpegNotFound,
                _ => MediaError::Io(e),
            })?;

        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let status = match self.timeout {
            Some(timeout) => {
                let waited = tokio::time::timeout(timeout, child.wait()).await;
                match waited {
                    Ok(status) => status?,
                    Err(_) => {
                        warn!(
                            "FFmpeg timed out after {} seconds, killing process",
                            timeout.as_secs()
                        );
                        let _ = child.kill().await;
                        stderr_task.abort();
                        return Err(MediaError::Timeout(timeout.as_secs()));
                    }
                }
            }
            None => child.wait().await?,
        };

        let stderr = stderr_task.await.unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                format!(
                    "FFmpeg exited with status {}{}",
                    status
                        .code()
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "signal".to_string()),
                    last_line(&stderr)
                        .map(|l| format!(": {l}"))
                        .unwrap_or_default()
                ),
                Some(stderr_tail(&stderr)),
                status.code(),
            ))
        }
    }
}

fn last_line(stderr: &str) -> Option<&str> {
    stderr.lines().rev().map(str::trim).find(|l| !l.is_empty())
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("input.mp4", "output.mp4")
            .duration(30)
            .stream_copy()
            .output_args(["-avoid_negative_ts", "make_zero"]);

        let args = cmd.build_args();
        assert_eq!(args.first().map(String::as_str), Some("-y"));
        assert!(args.windows(2).any(|w| w == ["-i", "input.mp4"]));
        assert!(args.windows(2).any(|w| w == ["-t", "30"]));
        assert!(args.windows(2).any(|w| w == ["-c", "copy"]));
        assert_eq!(args.last().map(String::as_str), Some("output.mp4"));
    }

    #[test]
    fn test_multiple_inputs_keep_order() {
        let cmd = FfmpegCommand::new("intro.mp4", "out.mp4")
            .input("main.mp4")
            .input("outro.mp4");

        let args = cmd.build_args();
        let inputs: Vec<&str> = args
            .windows(2)
            .filter(|w| w[0] == "-i")
            .map(|w| w[1].as_str())
            .collect();
        assert_eq!(inputs, vec!["intro.mp4", "main.mp4", "outro.mp4"]);
        assert_eq!(cmd.inputs().len(), 3);
    }

    #[test]
    fn test_stderr_tail_and_last_line() {
        let stderr = (0..30).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let tail = stderr_tail(&stderr);
        assert_eq!(tail.lines().count(), STDERR_TAIL_LINES);
        assert!(tail.starts_with("line 10"));
        assert_eq!(last_line("a\nNo such file\n\n"), Some("No such file"));
        assert_eq!(last_line(""), None);
    }
}
