//! Kafka task protocol for asynchronous video processing.
//!
//! This crate provides:
//! - The wire-level task record and its dead-letter envelope
//! - The three logical channels (primary, retry, dead-letter)
//! - A producer keyed by video id, over a pluggable message sink
//! - A consumer-group source with per-consumer state tracking
//!
//! Every message is keyed by the video id. Kafka routes equal keys to the
//! same partition, so all tasks for one video are consumed in order by a
//! single group member. Workers rely on this to mutate a video without
//! locking.

pub mod config;
pub mod error;
pub mod kafka;
pub mod lease;
pub mod memory;
pub mod producer;
pub mod sink;
pub mod source;
pub mod state;
pub mod task;
pub mod topics;

pub use config::QueueConfig;
pub use error::{QueueError, QueueResult};
pub use kafka::{KafkaSink, KafkaTaskSource};
pub use lease::{Lease, PartitionLeases};
pub use memory::{MemorySink, MemorySource};
pub use producer::{TaskProducer, TASK_ID_HEADER, TIMESTAMP_HEADER};
pub use sink::{MessageSink, OutboundMessage};
pub use source::{ConsumerEvent, Delivery, PartitionKey, TaskSource};
pub use state::{ConsumerState, ConsumerStateMachine};
pub use task::{DeadLetterTask, VideoProcessingTask};
pub use topics::{Channel, DEAD_LETTER_TOPIC, PRIMARY_TOPIC, RETRY_TOPIC};
