//! Inbound message port.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::QueueResult;
use crate::lease::PartitionLeases;
use crate::topics::Channel;

/// A `(topic, partition)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub topic: String,
    pub partition: i32,
}

impl PartitionKey {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.topic, self.partition)
    }
}

/// A message received from a consumed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

impl Delivery {
    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey::new(self.topic.clone(), self.partition)
    }

    pub fn channel(&self) -> Option<Channel> {
        Channel::from_topic(&self.topic)
    }
}

/// What a source yields: a message or a change of partition ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerEvent {
    Message(Delivery),
    Assigned(Vec<PartitionKey>),
    Revoked(Vec<PartitionKey>),
}

/// Consumer-group membership that yields deliveries.
///
/// Acknowledging a delivery marks its offset for the next commit; it is
/// cheap and synchronous. Unacknowledged messages are redelivered after a
/// restart or rebalance.
///
/// A `Revoked` event is only yielded after every lease on the revoked
/// partitions has been dropped.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Wait for the next message or rebalance.
    async fn next_event(&self) -> QueueResult<ConsumerEvent>;

    /// Mark `delivery` as processed.
    fn ack(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Redeliver `delivery` and everything after it on its partition.
    fn rewind(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Synchronously commit every acknowledged offset.
    async fn commit(&self) -> QueueResult<()>;

    /// Ownership leases workers must hold while handling a message.
    fn leases(&self) -> Arc<PartitionLeases>;

    /// Stop fetching `partition` until [`TaskSource::resume`].
    fn pause(&self, partition: &PartitionKey) -> QueueResult<()>;

    fn resume(&self, partition: &PartitionKey) -> QueueResult<()>;
}
