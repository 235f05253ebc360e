//! In-process sink and source for tests and local runs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{QueueError, QueueResult};
use crate::lease::PartitionLeases;
use crate::sink::{MessageSink, OutboundMessage};
use crate::source::{ConsumerEvent, Delivery, PartitionKey, TaskSource};
use crate::task::{DeadLetterTask, VideoProcessingTask};
use crate::topics::Channel;

/// Records every message it is given.
#[derive(Debug, Default)]
pub struct MemorySink {
    sent: Mutex<Vec<OutboundMessage>>,
    failures_left: AtomicU32,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `n` sends.
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, channel: Channel) -> Vec<OutboundMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.topic == channel.topic())
            .collect()
    }

    /// Tasks published to the primary or retry channel.
    pub fn tasks(&self, channel: Channel) -> Vec<VideoProcessingTask> {
        self.sent_to(channel)
            .iter()
            .filter_map(|m| VideoProcessingTask::from_json(&m.payload).ok())
            .collect()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetterTask> {
        self.sent_to(Channel::DeadLetter)
            .iter()
            .filter_map(|m| serde_json::from_slice(&m.payload).ok())
            .collect()
    }
}

#[async_trait]
impl MessageSink for MemorySink {
    async fn send(&self, message: OutboundMessage) -> QueueResult<()> {
        let rejected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(QueueError::publish_failed(
                message.topic,
                "broker unavailable",
            ));
        }

        self.sent
            .lock()
            .map_err(|_| QueueError::publish_failed(&message.topic, "sink poisoned"))?
            .push(message);
        Ok(())
    }
}

/// Source fed by hand: push deliveries and rebalances, read back acks.
///
/// Mirrors the broker behaviors workers depend on: a revoke is reported
/// only after in-flight work on the partition drained, paused partitions
/// hold their messages back, and a rewind replays the partition from the
/// rewound offset.
#[derive(Debug)]
pub struct MemorySource {
    tx: mpsc::UnboundedSender<ConsumerEvent>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ConsumerEvent>>,
    leases: Arc<PartitionLeases>,
    revoke_timeout: Duration,
    next_offsets: Mutex<HashMap<PartitionKey, i64>>,
    log: Mutex<HashMap<PartitionKey, Vec<Delivery>>>,
    paused: Mutex<HashSet<PartitionKey>>,
    held: Mutex<HashMap<PartitionKey, VecDeque<Delivery>>>,
    // A revoke being drained; kept here so a cancelled wait resumes.
    pending_revoke: Mutex<Option<Vec<PartitionKey>>>,
    acked: Mutex<Vec<Delivery>>,
    rewinds: AtomicUsize,
    pauses: AtomicUsize,
    commits: AtomicUsize,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemorySource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            leases: PartitionLeases::new(),
            revoke_timeout: Duration::from_secs(30),
            next_offsets: Mutex::new(HashMap::new()),
            log: Mutex::new(HashMap::new()),
            paused: Mutex::new(HashSet::new()),
            held: Mutex::new(HashMap::new()),
            pending_revoke: Mutex::new(None),
            acked: Mutex::new(Vec::new()),
            rewinds: AtomicUsize::new(0),
            pauses: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
        }
    }

    /// Enqueue a raw payload on `topic`/`partition` at the next offset.
    pub fn push_raw(&self, topic: &str, partition: i32, key: Option<String>, payload: Vec<u8>) -> Delivery {
        let partition_key = PartitionKey::new(topic, partition);
        let offset = {
            let mut offsets = lock(&self.next_offsets);
            let next = offsets.entry(partition_key.clone()).or_insert(0);
            let offset = *next;
            *next += 1;
            offset
        };
        let delivery = Delivery {
            topic: topic.to_string(),
            partition,
            offset,
            key,
            payload,
        };
        lock(&self.log)
            .entry(partition_key)
            .or_default()
            .push(delivery.clone());
        let _ = self.tx.send(ConsumerEvent::Message(delivery.clone()));
        delivery
    }

    /// Enqueue a task on `channel`.
    pub fn push_task(&self, channel: Channel, partition: i32, task: &VideoProcessingTask) -> Delivery {
        let payload = serde_json::to_vec(task).unwrap_or_default();
        self.push_raw(channel.topic(), partition, Some(task.key()), payload)
    }

    pub fn push_event(&self, event: ConsumerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn acked(&self) -> Vec<Delivery> {
        lock(&self.acked).clone()
    }

    pub fn is_acked(&self, delivery: &Delivery) -> bool {
        self.acked().iter().any(|a| {
            a.topic == delivery.topic && a.partition == delivery.partition && a.offset == delivery.offset
        })
    }

    pub fn rewinds(&self) -> usize {
        self.rewinds.load(Ordering::SeqCst)
    }

    /// How many times any partition was paused.
    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self, partition: &PartitionKey) -> bool {
        lock(&self.paused).contains(partition)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn holds(&self, partition: &PartitionKey) -> bool {
        self.is_paused(partition)
            || lock(&self.held)
                .get(partition)
                .is_some_and(|queue| !queue.is_empty())
    }

    /// Oldest held message of a partition that is no longer paused.
    fn pop_resumed(&self) -> Option<Delivery> {
        let paused = lock(&self.paused).clone();
        let mut held = lock(&self.held);
        held.iter_mut()
            .filter(|(partition, _)| !paused.contains(*partition))
            .find_map(|(_, queue)| queue.pop_front())
    }

    fn forget(&self, partitions: &[PartitionKey]) {
        let mut held = lock(&self.held);
        let mut paused = lock(&self.paused);
        for partition in partitions {
            held.remove(partition);
            paused.remove(partition);
        }
    }
}

#[async_trait]
impl TaskSource for MemorySource {
    async fn next_event(&self) -> QueueResult<ConsumerEvent> {
        loop {
            let pending = lock(&self.pending_revoke).clone();
            if let Some(partitions) = pending {
                self.leases.revoke(&partitions, self.revoke_timeout).await;
                lock(&self.pending_revoke).take();
                return Ok(ConsumerEvent::Revoked(partitions));
            }

            if let Some(delivery) = self.pop_resumed() {
                return Ok(ConsumerEvent::Message(delivery));
            }

            let event = self.rx.lock().await.recv().await.ok_or(QueueError::Closed)?;
            match event {
                ConsumerEvent::Message(delivery) if self.holds(&delivery.partition_key()) => {
                    lock(&self.held)
                        .entry(delivery.partition_key())
                        .or_default()
                        .push_back(delivery);
                }
                ConsumerEvent::Revoked(partitions) => {
                    self.forget(&partitions);
                    *lock(&self.pending_revoke) = Some(partitions);
                }
                ConsumerEvent::Assigned(partitions) => {
                    self.leases.assign(&partitions);
                    return Ok(ConsumerEvent::Assigned(partitions));
                }
                message => return Ok(message),
            }
        }
    }

    fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        if self.leases.can_ack(&delivery.partition_key()) {
            lock(&self.acked).push(delivery.clone());
        }
        Ok(())
    }

    fn rewind(&self, delivery: &Delivery) -> QueueResult<()> {
        self.rewinds.fetch_add(1, Ordering::SeqCst);
        let replay: Vec<Delivery> = lock(&self.log)
            .get(&delivery.partition_key())
            .map(|log| {
                log.iter()
                    .filter(|d| d.offset >= delivery.offset)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        for message in replay {
            self.tx
                .send(ConsumerEvent::Message(message))
                .map_err(|_| QueueError::Closed)?;
        }
        Ok(())
    }

    async fn commit(&self) -> QueueResult<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn leases(&self) -> Arc<PartitionLeases> {
        Arc::clone(&self.leases)
    }

    fn pause(&self, partition: &PartitionKey) -> QueueResult<()> {
        if lock(&self.paused).insert(partition.clone()) {
            self.pauses.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn resume(&self, partition: &PartitionKey) -> QueueResult<()> {
        lock(&self.paused).remove(partition);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anb_models::VideoId;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_sink_failure_budget() {
        let sink = MemorySink::new();
        sink.fail_next(1);
        let msg = OutboundMessage {
            topic: "video-processing".into(),
            key: "k".into(),
            payload: b"{}".to_vec(),
            headers: vec![],
        };
        assert!(sink.send(msg.clone()).await.is_err());
        assert!(sink.send(msg).await.is_ok());
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_source_assigns_offsets_per_partition() {
        let source = MemorySource::new();
        let task = VideoProcessingTask::new(VideoId::new(), Uuid::new_v4(), "t", "/x.mp4");
        let a = source.push_task(Channel::Primary, 0, &task);
        let b = source.push_task(Channel::Primary, 0, &task);
        let c = source.push_task(Channel::Primary, 1, &task);
        assert_eq!((a.offset, b.offset, c.offset), (0, 1, 0));

        match source.next_event().await.unwrap() {
            ConsumerEvent::Message(d) => assert_eq!(d, a),
            other => panic!("unexpected event: {other:?}"),
        }
        source.ack(&a).unwrap();
        assert!(source.is_acked(&a));
        assert!(!source.is_acked(&b));
    }

    fn message(event: ConsumerEvent) -> Delivery {
        match event {
            ConsumerEvent::Message(d) => d,
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_paused_partition_is_held_back() {
        let source = MemorySource::new();
        let task = VideoProcessingTask::new(VideoId::new(), Uuid::new_v4(), "t", "/x.mp4");
        let p0 = PartitionKey::new(Channel::Primary.topic(), 0);
        source.pause(&p0).unwrap();

        source.push_task(Channel::Primary, 0, &task);
        let other = source.push_task(Channel::Primary, 1, &task);
        assert_eq!(message(source.next_event().await.unwrap()), other);

        source.resume(&p0).unwrap();
        let resumed = message(source.next_event().await.unwrap());
        assert_eq!((resumed.partition, resumed.offset), (0, 0));
        assert_eq!(source.pauses(), 1);
    }

    #[tokio::test]
    async fn test_rewind_replays_from_offset() {
        let source = MemorySource::new();
        let task = VideoProcessingTask::new(VideoId::new(), Uuid::new_v4(), "t", "/x.mp4");
        let first = source.push_task(Channel::Primary, 0, &task);
        let second = source.push_task(Channel::Primary, 0, &task);
        message(source.next_event().await.unwrap());
        message(source.next_event().await.unwrap());

        source.rewind(&first).unwrap();
        assert_eq!(message(source.next_event().await.unwrap()), first);
        assert_eq!(message(source.next_event().await.unwrap()), second);
    }

    #[tokio::test]
    async fn test_revoke_is_reported_after_leases_drain() {
        let source = std::sync::Arc::new(MemorySource::new());
        let p0 = PartitionKey::new(Channel::Primary.topic(), 0);
        let lease = source.leases().acquire(&p0).unwrap();
        source.push_event(ConsumerEvent::Revoked(vec![p0.clone()]));

        let next = {
            let source = source.clone();
            tokio::spawn(async move { source.next_event().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!next.is_finished());

        drop(lease);
        assert_eq!(
            next.await.unwrap().unwrap(),
            ConsumerEvent::Revoked(vec![p0.clone()])
        );
        assert!(source.leases().acquire(&p0).is_none());
    }
}
