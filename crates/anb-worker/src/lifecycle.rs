//! Video lifecycle orchestration.
//!
//! One task moves one video through `processing` and into `published` or
//! `failed`. The orchestrator never decides about retries; it reports the
//! outcome and lets the consumer choose.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::Instrument;

use anb_media::TransformEngine;
use anb_models::{ProcessedOutput, Video};
use anb_queue::VideoProcessingTask;
use anb_store::{StoreError, VideoStore};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::TaskLogger;

/// Runs a task to completion for the consumer.
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    async fn process_task(&self, task: &VideoProcessingTask) -> WorkerResult<()>;
}

/// Loads the video, drives its status and runs the pipeline.
pub struct LifecycleOrchestrator {
    store: Arc<dyn VideoStore>,
    engine: Arc<dyn TransformEngine>,
    url_prefix: String,
}

impl LifecycleOrchestrator {
    pub fn new(
        store: Arc<dyn VideoStore>,
        engine: Arc<dyn TransformEngine>,
        url_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            engine,
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    /// `<dir of source>/<id>_processed.mp4`
    pub fn output_path(video: &Video) -> PathBuf {
        let source = Path::new(&video.original_url);
        source
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(video.id.processed_file_name())
    }

    /// Public URL of a processed file.
    pub fn public_url(&self, output: &Path) -> String {
        let name = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}/{}", self.url_prefix, name)
    }

    async fn run(&self, task: &VideoProcessingTask, logger: &TaskLogger) -> WorkerResult<()> {
        let mut video = self.store.find_by_id(task.video_id).await.map_err(|e| match e {
            StoreError::NotFound(id) => WorkerError::VideoNotFound(id),
            other => WorkerError::Store(other),
        })?;

        video.start_processing()?;
        if let Err(e) = self.store.update(&video).await {
            // A stale status is overwritten by the final update.
            logger.log_warning(&format!("failed to persist processing status: {e}"));
        }

        let input = PathBuf::from(&video.original_url);
        let output = Self::output_path(&video);
        logger.log_progress(&format!(
            "transforming {} -> {}",
            input.display(),
            output.display()
        ));

        if let Err(e) = self.engine.transform(&input, &output).await {
            video.mark_failed()?;
            if let Err(persist) = self.store.update(&video).await {
                logger.log_error(&format!("failed to persist failed status: {persist}"));
            }
            return Err(e.into());
        }

        video.publish(ProcessedOutput::standard(self.public_url(&output)), Utc::now())?;
        self.store.update(&video).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskProcessor for LifecycleOrchestrator {
    async fn process_task(&self, task: &VideoProcessingTask) -> WorkerResult<()> {
        let logger = TaskLogger::new(task, "video_processing");
        let span = logger.create_span();

        async {
            logger.log_start(&task.title);
            let result = self.run(task, &logger).await;
            match &result {
                Ok(()) => logger.log_completion("video published"),
                Err(e) => logger.log_error(&e.to_string()),
            }
            result
        }
        .instrument(span)
        .await
    }
}
