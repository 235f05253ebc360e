//! Video processing worker.
//!
//! This crate provides:
//! - The lifecycle orchestrator driving a video's status around the pipeline
//! - Per-message retry and dead-letter handling with exponential backoff
//! - Ordered per-partition workers and the consumer-group receive loop
//! - Graceful shutdown

pub mod backoff;
pub mod config;
pub mod error;
pub mod executor;
pub mod handler;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod partition;
pub mod retry;

pub use backoff::{Backoff, JitterMode};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::TaskExecutor;
pub use handler::{Disposition, TaskHandler};
pub use lifecycle::{LifecycleOrchestrator, TaskProcessor};
pub use logging::TaskLogger;
pub use partition::PartitionDispatcher;
pub use retry::{retry_async, RetryConfig};
