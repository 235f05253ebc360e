//! rdkafka adapters for the sink and source ports.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{ClientContext, Message, Offset, TopicPartitionList};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::lease::PartitionLeases;
use crate::sink::{MessageSink, OutboundMessage};
use crate::source::{ConsumerEvent, Delivery, PartitionKey, TaskSource};
use crate::topics::Channel;

/// Producer with wait-for-all-replicas acknowledgement.
pub struct KafkaSink {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaSink {
    pub fn new(config: &QueueConfig) -> QueueResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("client.id", &config.client_id)
            .set("message.timeout.ms", config.message_timeout.as_millis().to_string())
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("retries", config.producer_retries.to_string())
            .create()
            .map_err(|e| QueueError::connection_failed(format!("producer: {e}")))?;

        info!("Kafka producer created for brokers {}", config.brokers);
        Ok(Self {
            producer,
            timeout: config.message_timeout,
        })
    }
}

#[async_trait]
impl MessageSink for KafkaSink {
    async fn send(&self, message: OutboundMessage) -> QueueResult<()> {
        let headers = message
            .headers
            .iter()
            .fold(OwnedHeaders::new(), |headers, (key, value)| {
                headers.insert(Header {
                    key: key.as_str(),
                    value: Some(value.as_bytes()),
                })
            });

        let record = FutureRecord::to(&message.topic)
            .key(&message.key)
            .payload(&message.payload)
            .headers(headers);

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(self.timeout))
            .await
            .map_err(|(err, _)| QueueError::publish_failed(&message.topic, err.to_string()))?;

        debug!(
            topic = %message.topic,
            partition,
            offset,
            "Delivery acknowledged"
        );
        Ok(())
    }
}

/// Forwards rebalance callbacks to the receive loop.
///
/// Revocation blocks the callback until the workers holding leases on the
/// revoked partitions are done, so librdkafka cannot hand a partition to
/// another member while a message of it is still being processed here.
pub struct TaskConsumerContext {
    events: mpsc::UnboundedSender<ConsumerEvent>,
    leases: Arc<PartitionLeases>,
    revoke_timeout: Duration,
}

fn partition_keys(tpl: &TopicPartitionList) -> Vec<PartitionKey> {
    tpl.elements()
        .iter()
        .map(|e| PartitionKey::new(e.topic(), e.partition()))
        .collect()
}

fn single_partition(partition: &PartitionKey) -> TopicPartitionList {
    let mut tpl = TopicPartitionList::new();
    tpl.add_partition(&partition.topic, partition.partition);
    tpl
}

impl ClientContext for TaskConsumerContext {}

impl ConsumerContext for TaskConsumerContext {
    fn pre_rebalance(&self, rebalance: &Rebalance) {
        match rebalance {
            Rebalance::Revoke(tpl) => {
                let partitions = partition_keys(tpl);
                info!("Partitions revoked, draining in-flight work: {:?}", partitions);
                if !self.leases.revoke_blocking(&partitions, self.revoke_timeout) {
                    warn!(
                        "In-flight work on {:?} did not finish within {:?}",
                        partitions, self.revoke_timeout
                    );
                }
                let _ = self.events.send(ConsumerEvent::Revoked(partitions));
            }
            Rebalance::Assign(tpl) => {
                debug!("Partition assignment pending: {:?}", tpl);
            }
            Rebalance::Error(err) => {
                error!("Rebalance error: {}", err);
            }
        }
    }

    fn post_rebalance(&self, rebalance: &Rebalance) {
        if let Rebalance::Assign(tpl) = rebalance {
            let partitions = partition_keys(tpl);
            info!("Partitions assigned: {:?}", partitions);
            self.leases.assign(&partitions);
            let _ = self.events.send(ConsumerEvent::Assigned(partitions));
        }
    }

    fn commit_callback(&self, result: KafkaResult<()>, _offsets: &TopicPartitionList) {
        if let Err(err) = result {
            warn!("Offset commit failed: {}", err);
        }
    }
}

/// Consumer-group member reading the primary and retry channels.
///
/// Offsets are stored explicitly on ack and committed in the background
/// by librdkafka, so only processed messages are ever committed.
pub struct KafkaTaskSource {
    consumer: StreamConsumer<TaskConsumerContext>,
    rebalances: tokio::sync::Mutex<mpsc::UnboundedReceiver<ConsumerEvent>>,
    leases: Arc<PartitionLeases>,
}

impl KafkaTaskSource {
    pub fn new(config: &QueueConfig) -> QueueResult<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let leases = PartitionLeases::new();
        let context = TaskConsumerContext {
            events: tx,
            leases: Arc::clone(&leases),
            revoke_timeout: config.revoke_timeout,
        };

        let consumer: StreamConsumer<TaskConsumerContext> = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("client.id", &config.client_id)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .set("partition.assignment.strategy", "roundrobin")
            .set("session.timeout.ms", config.session_timeout.as_millis().to_string())
            .set(
                "heartbeat.interval.ms",
                config.heartbeat_interval.as_millis().to_string(),
            )
            .set(
                "max.poll.interval.ms",
                config.max_poll_interval.as_millis().to_string(),
            )
            .create_with_context(context)
            .map_err(|e| QueueError::connection_failed(format!("consumer: {e}")))?;

        let topics: Vec<&str> = Channel::CONSUMED.iter().map(|c| c.topic()).collect();
        consumer.subscribe(&topics)?;
        info!(
            "Joined consumer group {} on topics {:?}",
            config.group_id, topics
        );

        Ok(Self {
            consumer,
            rebalances: tokio::sync::Mutex::new(rx),
            leases,
        })
    }
}

#[async_trait]
impl TaskSource for KafkaTaskSource {
    async fn next_event(&self) -> QueueResult<ConsumerEvent> {
        let mut rebalances = self.rebalances.lock().await;

        // Rebalance callbacks fire inside recv(), so drain them first.
        if let Ok(event) = rebalances.try_recv() {
            return Ok(event);
        }

        tokio::select! {
            biased;
            Some(event) = rebalances.recv() => Ok(event),
            received = self.consumer.recv() => {
                let msg = received.map_err(|e| QueueError::receive_failed(e.to_string()))?;
                Ok(ConsumerEvent::Message(Delivery {
                    topic: msg.topic().to_string(),
                    partition: msg.partition(),
                    offset: msg.offset(),
                    key: msg.key().map(|k| String::from_utf8_lossy(k).into_owned()),
                    payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                }))
            }
        }
    }

    fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        if !self.leases.can_ack(&delivery.partition_key()) {
            // The new owner will see this message again.
            debug!(
                "Skipping offset store for revoked partition {}",
                delivery.partition_key()
            );
            return Ok(());
        }

        // A stored offset names the next message to read.
        self.consumer
            .store_offset(&delivery.topic, delivery.partition, delivery.offset + 1)
            .map_err(|e: KafkaError| QueueError::AckFailed {
                topic: delivery.topic.clone(),
                partition: delivery.partition,
                offset: delivery.offset,
                message: e.to_string(),
            })
    }

    fn rewind(&self, delivery: &Delivery) -> QueueResult<()> {
        warn!(
            "Rewinding {} to offset {}",
            delivery.partition_key(),
            delivery.offset
        );
        self.consumer
            .seek(
                &delivery.topic,
                delivery.partition,
                Offset::Offset(delivery.offset),
                Timeout::After(Duration::from_secs(5)),
            )
            .map_err(|e| QueueError::receive_failed(format!("seek failed: {e}")))
    }

    async fn commit(&self) -> QueueResult<()> {
        match self.consumer.commit_consumer_state(CommitMode::Sync) {
            Ok(()) => Ok(()),
            // Nothing stored since the last commit.
            Err(KafkaError::ConsumerCommit(rdkafka::types::RDKafkaErrorCode::NoOffset)) => Ok(()),
            Err(e) => Err(QueueError::CommitFailed(e.to_string())),
        }
    }

    fn leases(&self) -> Arc<PartitionLeases> {
        Arc::clone(&self.leases)
    }

    fn pause(&self, partition: &PartitionKey) -> QueueResult<()> {
        debug!("Pausing fetch for {}", partition);
        Ok(self.consumer.pause(&single_partition(partition))?)
    }

    fn resume(&self, partition: &PartitionKey) -> QueueResult<()> {
        debug!("Resuming fetch for {}", partition);
        Ok(self.consumer.resume(&single_partition(partition))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::TaskProducer;
    use crate::task::VideoProcessingTask;
    use anb_models::VideoId;
    use uuid::Uuid;

    #[tokio::test]
    #[ignore = "requires Kafka"]
    async fn test_publish_and_consume_roundtrip() {
        let config = QueueConfig::from_env();
        let producer = TaskProducer::new(Arc::new(KafkaSink::new(&config).unwrap()));
        let source = KafkaTaskSource::new(&config).unwrap();

        let task = VideoProcessingTask::new(VideoId::new(), Uuid::new_v4(), "kafka", "/tmp/k.mp4");
        producer.publish(&task).await.unwrap();

        loop {
            if let ConsumerEvent::Message(delivery) = source.next_event().await.unwrap() {
                let received = VideoProcessingTask::from_json(&delivery.payload).unwrap();
                if received.video_id == task.video_id {
                    assert_eq!(delivery.key.as_deref(), Some(task.key().as_str()));
                    source.ack(&delivery).unwrap();
                    source.commit().await.unwrap();
                    break;
                }
            }
        }
    }
}
