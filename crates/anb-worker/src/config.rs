//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::backoff::JitterMode;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory for intermediate pipeline artifacts
    pub temp_dir: PathBuf,
    /// Directory holding logo.png, intro.mp4 and outro.mp4
    pub assets_dir: PathBuf,
    /// Failed attempts allowed before a task is dead-lettered
    pub max_retries: u32,
    /// Base delay of the retry backoff (doubles per attempt)
    pub backoff_base: Duration,
    /// Jitter applied to the retry backoff
    pub backoff_jitter: JitterMode,
    /// Deliveries buffered per partition worker
    pub partition_buffer: usize,
    /// Upper bound for a single encoder invocation
    pub ffmpeg_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Attempts for a retry or dead-letter publish before giving up
    pub publish_retries: u32,
    /// Public URL prefix of processed files
    pub storage_url_prefix: String,
    /// Prometheus listen address, if metrics are exported
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("./temp"),
            assets_dir: PathBuf::from("./assets"),
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            backoff_jitter: JitterMode::Random,
            partition_buffer: 64,
            ffmpeg_timeout: Duration::from_secs(600), // 10 minutes
            shutdown_timeout: Duration::from_secs(30),
            publish_retries: 3,
            storage_url_prefix: "/storage".to_string(),
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            temp_dir: std::env::var("WORKER_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir),
            assets_dir: std::env::var("WORKER_ASSETS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.assets_dir),
            max_retries: env_parse("WORKER_MAX_RETRIES").unwrap_or(defaults.max_retries),
            backoff_base: env_parse("WORKER_BACKOFF_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_base),
            backoff_jitter: std::env::var("WORKER_BACKOFF_JITTER")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.backoff_jitter),
            partition_buffer: env_parse("WORKER_PARTITION_BUFFER")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.partition_buffer),
            ffmpeg_timeout: env_parse("WORKER_FFMPEG_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ffmpeg_timeout),
            shutdown_timeout: env_parse("WORKER_SHUTDOWN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            publish_retries: env_parse("WORKER_PUBLISH_RETRIES").unwrap_or(defaults.publish_retries),
            storage_url_prefix: std::env::var("STORAGE_URL_PREFIX")
                .unwrap_or(defaults.storage_url_prefix),
            metrics_addr: env_parse("METRICS_ADDR"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.backoff_base, Duration::from_secs(1));
        assert_eq!(config.temp_dir, PathBuf::from("./temp"));
        assert_eq!(config.storage_url_prefix, "/storage");
        assert!(config.metrics_addr.is_none());
    }
}
