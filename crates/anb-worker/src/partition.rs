//! Partition workers.
//!
//! Each `(topic, partition)` gets one task that handles its deliveries
//! strictly in order. Distinct partitions run in parallel. Since every
//! message is keyed by video id, this also serializes work per video.
//!
//! Dispatch never waits on a worker. When a worker's buffer is full the
//! partition is paused at the source and further deliveries queue in a
//! backlog until [`PartitionDispatcher::flush`] moves them on, so a slow
//! encode or a retry backoff only holds up its own partition.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use anb_queue::{Delivery, PartitionKey, PartitionLeases, TaskSource};

use crate::handler::{Disposition, TaskHandler};

struct PartitionWorker {
    tx: mpsc::Sender<Delivery>,
    handle: JoinHandle<()>,
    backlog: VecDeque<Delivery>,
    paused: bool,
}

/// Routes deliveries to their partition worker, spawning workers on demand.
pub struct PartitionDispatcher {
    handler: Arc<TaskHandler>,
    source: Arc<dyn TaskSource>,
    leases: Arc<PartitionLeases>,
    buffer: usize,
    workers: HashMap<PartitionKey, PartitionWorker>,
    // Workers of revoked partitions; they exit once their channel drains.
    retired: Vec<JoinHandle<()>>,
}

impl PartitionDispatcher {
    pub fn new(handler: Arc<TaskHandler>, source: Arc<dyn TaskSource>, buffer: usize) -> Self {
        Self {
            handler,
            leases: source.leases(),
            source,
            buffer: buffer.max(1),
            workers: HashMap::new(),
            retired: Vec::new(),
        }
    }

    /// Number of live partition workers.
    pub fn active_partitions(&self) -> usize {
        self.workers.len()
    }

    /// Whether any partition has deliveries waiting for buffer space.
    pub fn has_backlog(&self) -> bool {
        self.workers.values().any(|w| !w.backlog.is_empty())
    }

    /// Hand `delivery` to its partition worker without waiting.
    pub fn dispatch(&mut self, delivery: Delivery) {
        let key = delivery.partition_key();

        if self.workers.get(&key).is_some_and(|w| w.tx.is_closed()) {
            if let Some(dead) = self.workers.remove(&key) {
                self.retired.push(dead.handle);
            }
        }
        if !self.workers.contains_key(&key) {
            let worker = self.spawn(key.clone());
            self.workers.insert(key.clone(), worker);
        }
        let Some(worker) = self.workers.get_mut(&key) else {
            return;
        };

        if !worker.backlog.is_empty() {
            worker.backlog.push_back(delivery);
            return;
        }

        match worker.tx.try_send(delivery) {
            Ok(()) => {}
            Err(TrySendError::Full(delivery)) => {
                worker.backlog.push_back(delivery);
                if !worker.paused {
                    debug!("Partition {} is busy, pausing fetch", key);
                    match self.source.pause(&key) {
                        Ok(()) => worker.paused = true,
                        Err(e) => warn!("Failed to pause {}: {}", key, e),
                    }
                }
            }
            Err(TrySendError::Closed(delivery)) => {
                // The worker gave up its partition; the next owner redelivers.
                debug!("Dropping {}@{} for stopped worker", key, delivery.offset);
            }
        }
    }

    /// Move backlogged deliveries into worker buffers that have room, and
    /// resume partitions whose backlog is empty again.
    pub fn flush(&mut self) {
        for (key, worker) in self.workers.iter_mut() {
            while let Some(delivery) = worker.backlog.pop_front() {
                match worker.tx.try_send(delivery) {
                    Ok(()) => {}
                    Err(TrySendError::Full(delivery)) => {
                        worker.backlog.push_front(delivery);
                        break;
                    }
                    Err(TrySendError::Closed(_)) => {
                        worker.backlog.clear();
                    }
                }
            }

            if worker.backlog.is_empty() && worker.paused {
                debug!("Partition {} caught up, resuming fetch", key);
                match self.source.resume(key) {
                    Ok(()) => worker.paused = false,
                    Err(e) => warn!("Failed to resume {}: {}", key, e),
                }
            }
        }
    }

    /// Drop the workers of `partitions` along with their buffered deliveries.
    ///
    /// The source has already waited for in-flight messages, so the
    /// workers only have unprocessed deliveries left, which the new owner
    /// receives again.
    pub fn revoke(&mut self, partitions: &[PartitionKey]) {
        for key in partitions {
            if let Some(worker) = self.workers.remove(key) {
                debug!("Retiring partition worker {}", key);
                if worker.paused {
                    if let Err(e) = self.source.resume(key) {
                        debug!("Resume of released {} failed: {}", key, e);
                    }
                }
                self.retired.push(worker.handle);
            }
        }
    }

    /// Close every worker and wait up to `timeout` for in-flight messages.
    ///
    /// Returns `true` if all workers finished in time.
    pub async fn shutdown(self, timeout: Duration) -> bool {
        self.leases.close();

        let handles: Vec<JoinHandle<()>> = self
            .workers
            .into_values()
            .map(|w| w.handle)
            .chain(self.retired)
            .collect();

        info!("Waiting for {} partition workers to finish", handles.len());
        tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_ok()
    }

    fn spawn(&self, key: PartitionKey) -> PartitionWorker {
        let (tx, rx) = mpsc::channel(self.buffer);

        let handle = tokio::spawn(run_partition(
            key,
            rx,
            Arc::clone(&self.handler),
            Arc::clone(&self.source),
            Arc::clone(&self.leases),
        ));

        PartitionWorker {
            tx,
            handle,
            backlog: VecDeque::new(),
            paused: false,
        }
    }
}

async fn run_partition(
    key: PartitionKey,
    mut rx: mpsc::Receiver<Delivery>,
    handler: Arc<TaskHandler>,
    source: Arc<dyn TaskSource>,
    leases: Arc<PartitionLeases>,
) {
    debug!("Partition worker {} started", key);
    // After a rewind, skip everything until the rewound offset comes back.
    let mut resume_at: Option<i64> = None;

    while let Some(delivery) = rx.recv().await {
        let Some(mut lease) = leases.acquire(&key) else {
            debug!("Partition {} no longer owned, stopping worker", key);
            break;
        };

        if let Some(offset) = resume_at {
            if delivery.offset != offset {
                debug!(
                    "Skipping {}@{} until rewind to {}",
                    key, delivery.offset, offset
                );
                continue;
            }
            resume_at = None;
        }

        let disposition = handler.handle(&delivery, lease.stop_signal()).await;

        match disposition {
            Disposition::Interrupted => break,
            Disposition::PublishFailed => {
                warn!(
                    "Leaving {}@{} unacknowledged for redelivery",
                    key, delivery.offset
                );
                match source.rewind(&delivery) {
                    Ok(()) => resume_at = Some(delivery.offset),
                    Err(e) => {
                        // Acking later offsets would commit past this one.
                        warn!("Rewind of {} failed, stopping worker: {}", key, e);
                        break;
                    }
                }
            }
            _ => {
                if let Err(e) = source.ack(&delivery) {
                    warn!("Failed to ack {}@{}: {}", key, delivery.offset, e);
                }
            }
        }
        // The lease is released only after the ack is stored.
        drop(lease);
    }

    debug!("Partition worker {} stopped", key);
}
