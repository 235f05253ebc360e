//! Video processing worker binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use anb_media::{FfmpegRunner, PipelineConfig, VideoPipeline};
use anb_queue::{KafkaSink, KafkaTaskSource, QueueConfig, TaskProducer};
use anb_store::{PgVideoStore, StoreConfig};
use anb_worker::logging::init_tracing;
use anb_worker::{
    metrics, Backoff, LifecycleOrchestrator, RetryConfig, TaskExecutor, TaskHandler, WorkerConfig,
};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    if let Err(e) = run().await {
        error!("Worker failed: {:#}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

async fn run() -> anyhow::Result<()> {
    info!("Starting anb-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        metrics::install_exporter(addr)?;
        info!("Serving metrics on {}", addr);
    }

    let runner = FfmpegRunner::locate()
        .context("ffmpeg is required to run the worker")?
        .with_timeout(config.ffmpeg_timeout);
    let pipeline = VideoPipeline::with_runner(
        PipelineConfig::new(&config.temp_dir, &config.assets_dir),
        runner,
    );

    let store = PgVideoStore::connect(&StoreConfig::from_env())
        .await
        .context("failed to connect to Postgres")?;

    let queue_config = QueueConfig::from_env();
    let sink = KafkaSink::new(&queue_config).context("failed to create Kafka producer")?;
    let source = KafkaTaskSource::new(&queue_config).context("failed to join consumer group")?;

    let orchestrator =
        LifecycleOrchestrator::new(Arc::new(store), Arc::new(pipeline), &config.storage_url_prefix);
    let handler = TaskHandler::new(
        Arc::new(orchestrator),
        TaskProducer::new(Arc::new(sink)),
        Backoff::new(config.backoff_base, config.backoff_jitter),
        config.max_retries,
    )
    .with_publish_retry(RetryConfig::new("republish").with_max_retries(config.publish_retries));

    let executor = Arc::new(TaskExecutor::new(config, Arc::new(source), handler));

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    executor.run().await?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    tokio::signal::ctrl_c().await.ok();
}
