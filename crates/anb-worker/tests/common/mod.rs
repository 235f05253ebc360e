//! Shared fixtures for worker integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use anb_media::{
    CommandRunner, FfmpegCommand, MediaError, MediaResult, PipelineStage, TransformEngine,
};
use anb_models::{Video, VideoId};
use anb_queue::{MemorySink, MemorySource, TaskProducer, VideoProcessingTask};
use anb_store::MemoryVideoStore;
use anb_worker::{
    Backoff, JitterMode, LifecycleOrchestrator, RetryConfig, TaskExecutor, TaskHandler,
    WorkerConfig,
};

/// Engine that fails the first `failures` calls at the concatenate stage.
pub struct ScriptedEngine {
    failures: AtomicUsize,
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
    pub calls: Mutex<Vec<PathBuf>>,
}

impl ScriptedEngine {
    pub fn succeeding() -> Arc<Self> {
        Self::failing(0)
    }

    pub fn failing(failures: usize) -> Arc<Self> {
        Self::with_delay(failures, Duration::ZERO)
    }

    pub fn with_delay(failures: usize, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            failures: AtomicUsize::new(failures),
            delay,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Most transforms ever running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub fn concat_failure() -> MediaError {
    MediaError::stage_failed(
        PipelineStage::Concatenate,
        MediaError::ffmpeg_failed("FFmpeg exited with status 1", None, Some(1)),
    )
}

#[async_trait]
impl TransformEngine for ScriptedEngine {
    async fn transform(&self, input: &Path, _output: &Path) -> MediaResult<()> {
        self.calls.lock().unwrap().push(input.to_path_buf());
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        let fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            Err(concat_failure())
        } else {
            Ok(())
        }
    }
}

/// Runner that writes every output file without encoding anything.
pub struct TouchRunner;

#[async_trait]
impl CommandRunner for TouchRunner {
    async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        std::fs::write(cmd.output(), b"frames")?;
        Ok(())
    }
}

pub fn test_config() -> WorkerConfig {
    WorkerConfig {
        backoff_base: Duration::from_millis(1),
        backoff_jitter: JitterMode::Deterministic,
        shutdown_timeout: Duration::from_secs(5),
        ..WorkerConfig::default()
    }
}

pub fn fast_publish_retry() -> RetryConfig {
    RetryConfig::new("republish")
        .with_max_retries(1)
        .with_base_delay(Duration::from_millis(1))
}

/// Insert a freshly uploaded video and return a first-attempt task for it.
pub async fn uploaded_video(store: &MemoryVideoStore, file_path: &str) -> VideoProcessingTask {
    let video = Video::new(VideoId::new(), Uuid::new_v4(), "Slam dunk", file_path);
    store.insert(video.clone()).await;
    VideoProcessingTask::new(video.id, video.user_id, video.title, video.original_url)
}

pub struct Harness {
    pub store: Arc<MemoryVideoStore>,
    pub sink: Arc<MemorySink>,
    pub source: Arc<MemorySource>,
    pub engine: Arc<dyn TransformEngine>,
}

impl Harness {
    pub fn new(engine: Arc<dyn TransformEngine>) -> Self {
        Self {
            store: Arc::new(MemoryVideoStore::new()),
            sink: Arc::new(MemorySink::new()),
            source: Arc::new(MemorySource::new()),
            engine,
        }
    }

    pub fn handler(&self, config: &WorkerConfig) -> TaskHandler {
        let orchestrator = LifecycleOrchestrator::new(
            self.store.clone(),
            self.engine.clone(),
            &config.storage_url_prefix,
        );
        TaskHandler::new(
            Arc::new(orchestrator),
            TaskProducer::new(self.sink.clone()),
            Backoff::new(config.backoff_base, config.backoff_jitter),
            config.max_retries,
        )
        .with_publish_retry(fast_publish_retry())
    }

    pub fn executor(&self, config: WorkerConfig) -> Arc<TaskExecutor> {
        let handler = self.handler(&config);
        Arc::new(TaskExecutor::new(config, self.source.clone(), handler))
    }
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
