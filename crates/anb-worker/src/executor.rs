//! Task executor: the consumer-group receive loop.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use anb_queue::{ConsumerEvent, ConsumerState, ConsumerStateMachine, QueueError, TaskSource};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::handler::TaskHandler;
use crate::partition::PartitionDispatcher;
use crate::retry::FailureTracker;

/// Pause after a receive error before polling again.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// How often backlogged deliveries are offered to their workers again.
const BACKLOG_FLUSH_INTERVAL: Duration = Duration::from_millis(20);

/// Pulls deliveries and fans them out to partition workers until shutdown.
pub struct TaskExecutor {
    config: WorkerConfig,
    source: Arc<dyn TaskSource>,
    handler: Arc<TaskHandler>,
    state: Mutex<ConsumerStateMachine>,
    shutdown: watch::Sender<bool>,
}

impl TaskExecutor {
    pub fn new(config: WorkerConfig, source: Arc<dyn TaskSource>, handler: TaskHandler) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            source,
            handler: Arc::new(handler),
            state: Mutex::new(ConsumerStateMachine::new()),
            shutdown,
        }
    }

    /// Signal shutdown. Takes effect even before [`TaskExecutor::run`] starts.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Current consumer state.
    pub fn state(&self) -> ConsumerState {
        self.with_state(|sm| sm.state())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ConsumerStateMachine) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    /// Run until [`TaskExecutor::shutdown`] is called or the source closes.
    ///
    /// On exit, in-flight messages get `shutdown_timeout` to finish, then
    /// acknowledged offsets are committed synchronously.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting task executor (max retries {}, partition buffer {})",
            self.config.max_retries, self.config.partition_buffer
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut dispatcher = PartitionDispatcher::new(
            Arc::clone(&self.handler),
            Arc::clone(&self.source),
            self.config.partition_buffer,
        );
        let mut receive_failures = FailureTracker::new(5);
        let mut flush = tokio::time::interval(BACKLOG_FLUSH_INTERVAL);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown_rx.borrow_and_update() {
                info!("Shutdown signal received, stopping executor");
                break;
            }

            tokio::select! {
                _ = shutdown_rx.changed() => continue,
                _ = flush.tick(), if dispatcher.has_backlog() => dispatcher.flush(),
                event = self.source.next_event() => match event {
                    Ok(ConsumerEvent::Message(delivery)) => {
                        receive_failures.record_success();
                        if let Err(e) = self.with_state(|sm| sm.on_message()) {
                            warn!("Unexpected message: {}", e);
                        }
                        debug!(
                            topic = %delivery.topic,
                            partition = delivery.partition,
                            offset = delivery.offset,
                            "Dispatching delivery"
                        );
                        dispatcher.dispatch(delivery);
                    }
                    Ok(ConsumerEvent::Assigned(partitions)) => {
                        info!("Claimed partitions: {:?}", partitions);
                        if let Err(e) = self.with_state(|sm| sm.on_assigned()) {
                            warn!("Unexpected assignment: {}", e);
                        }
                    }
                    Ok(ConsumerEvent::Revoked(partitions)) => {
                        info!("Rebalancing, releasing partitions: {:?}", partitions);
                        if let Err(e) = self.with_state(|sm| sm.on_revoked()) {
                            warn!("Unexpected revoke: {}", e);
                        }
                        dispatcher.revoke(&partitions);
                    }
                    Err(QueueError::Closed) => {
                        info!("Task source closed, stopping executor");
                        break;
                    }
                    Err(e) => {
                        if receive_failures.record_failure() {
                            error!("Error receiving tasks: {}", e);
                        }
                        tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        self.shutdown();

        if !dispatcher.shutdown(self.config.shutdown_timeout).await {
            warn!(
                "In-flight tasks did not finish within {:?}",
                self.config.shutdown_timeout
            );
        }

        if let Err(e) = self.source.commit().await {
            error!("Final offset commit failed: {}", e);
        }

        self.with_state(|sm| sm.close());
        info!("Task executor stopped");
        Ok(())
    }
}
