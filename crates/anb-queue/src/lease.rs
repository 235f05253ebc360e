//! Partition ownership as seen by the processing side.
//!
//! A worker holds a [`Lease`] on its partition while it handles one
//! message. Revoking a partition refuses new leases and then waits until
//! every outstanding lease is dropped, so the rebalance only completes
//! once no message of that partition is still being processed here. This
//! keeps the one-owner-per-video guarantee across a rebalance.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{watch, Notify};
use tracing::{debug, warn};

use crate::source::PartitionKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ownership {
    /// Assigned to this member.
    Owned,
    /// Revoked; in-flight messages may still finish and ack.
    Draining,
    /// Handed over. Offsets can no longer be stored.
    Released,
}

#[derive(Debug)]
struct Slot {
    ownership: Ownership,
    in_flight: usize,
    stop: watch::Sender<bool>,
}

impl Slot {
    fn owned() -> Self {
        Self {
            ownership: Ownership::Owned,
            in_flight: 0,
            stop: watch::channel(false).0,
        }
    }
}

#[derive(Debug, Default)]
struct LeaseTable {
    slots: HashMap<PartitionKey, Slot>,
    closed: bool,
}

impl LeaseTable {
    fn busy(&self, keys: &[PartitionKey]) -> bool {
        keys.iter()
            .any(|k| self.slots.get(k).is_some_and(|s| s.in_flight > 0))
    }
}

/// Per-partition lease bookkeeping shared by a source and its workers.
#[derive(Debug, Default)]
pub struct PartitionLeases {
    table: Mutex<LeaseTable>,
    released: Condvar,
    released_async: Notify,
}

impl PartitionLeases {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, LeaseTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a lease for handling one message of `key`.
    ///
    /// Partitions never seen before count as owned. Returns `None` once the
    /// partition is revoked or the leases are closed.
    pub fn acquire(self: &Arc<Self>, key: &PartitionKey) -> Option<Lease> {
        let mut table = self.lock();
        if table.closed {
            return None;
        }
        let slot = table.slots.entry(key.clone()).or_insert_with(Slot::owned);
        if slot.ownership != Ownership::Owned {
            return None;
        }
        slot.in_flight += 1;
        Some(Lease {
            leases: Arc::clone(self),
            key: key.clone(),
            stop: slot.stop.subscribe(),
        })
    }

    /// Partitions (re)assigned to this member.
    pub fn assign(&self, keys: &[PartitionKey]) {
        let mut table = self.lock();
        for key in keys {
            let slot = table.slots.entry(key.clone()).or_insert_with(Slot::owned);
            if slot.ownership != Ownership::Owned {
                let in_flight = slot.in_flight;
                *slot = Slot::owned();
                slot.in_flight = in_flight;
            }
        }
    }

    /// Whether offsets of `key` may still be stored.
    pub fn can_ack(&self, key: &PartitionKey) -> bool {
        self.lock()
            .slots
            .get(key)
            .map_or(true, |s| s.ownership != Ownership::Released)
    }

    /// Refuse new leases everywhere and interrupt waiting holders.
    pub fn close(&self) {
        let mut table = self.lock();
        table.closed = true;
        for slot in table.slots.values() {
            slot.stop.send_replace(true);
        }
    }

    fn begin_revoke(&self, keys: &[PartitionKey]) {
        let mut table = self.lock();
        for key in keys {
            let slot = table.slots.entry(key.clone()).or_insert_with(Slot::owned);
            slot.ownership = Ownership::Draining;
            slot.stop.send_replace(true);
        }
    }

    fn finish_revoke(&self, mut table: MutexGuard<'_, LeaseTable>, keys: &[PartitionKey], drained: bool) -> bool {
        if !drained {
            warn!("Revoked partitions still busy, releasing anyway: {:?}", keys);
        }
        for key in keys {
            if let Some(slot) = table.slots.get_mut(key) {
                if slot.ownership == Ownership::Draining {
                    slot.ownership = Ownership::Released;
                }
            }
        }
        debug!("Released partitions {:?}", keys);
        drained
    }

    /// Revoke `keys` and wait up to `timeout` for their leases to drop.
    ///
    /// Returns `false` if the wait timed out. Blocks the calling thread; used
    /// from rebalance callbacks that run outside the async runtime's control.
    pub fn revoke_blocking(&self, keys: &[PartitionKey], timeout: Duration) -> bool {
        self.begin_revoke(keys);
        let table = self.lock();
        let (table, result) = self
            .released
            .wait_timeout_while(table, timeout, |t| t.busy(keys))
            .unwrap_or_else(PoisonError::into_inner);
        self.finish_revoke(table, keys, !result.timed_out())
    }

    /// Async form of [`PartitionLeases::revoke_blocking`].
    pub async fn revoke(&self, keys: &[PartitionKey], timeout: Duration) -> bool {
        self.begin_revoke(keys);
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.released_async.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let table = self.lock();
                if !table.busy(keys) {
                    return self.finish_revoke(table, keys, true);
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if tokio::time::timeout(remaining, notified).await.is_err() {
                let table = self.lock();
                let drained = !table.busy(keys);
                return self.finish_revoke(table, keys, drained);
            }
        }
    }

    fn release(&self, key: &PartitionKey) {
        let mut table = self.lock();
        if let Some(slot) = table.slots.get_mut(key) {
            slot.in_flight = slot.in_flight.saturating_sub(1);
        }
        drop(table);
        self.released.notify_all();
        self.released_async.notify_waiters();
    }
}

/// Permission to process one message of a partition.
#[derive(Debug)]
pub struct Lease {
    leases: Arc<PartitionLeases>,
    key: PartitionKey,
    stop: watch::Receiver<bool>,
}

impl Lease {
    /// Flips to `true` when the partition is revoked or the worker closes.
    ///
    /// Waits that may be abandoned, such as a retry backoff, select on it.
    pub fn stop_signal(&mut self) -> &mut watch::Receiver<bool> {
        &mut self.stop
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.leases.release(&self.key);
    }
}
