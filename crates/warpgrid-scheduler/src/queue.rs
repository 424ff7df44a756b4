//! Pending queue — workloads awaiting a placement decision.
//!
//! Any number of producers (the watch feed) call [`SchedulingQueue::add`];
//! the single scheduling loop consumes with
//! [`SchedulingQueue::next_workload`], which parks on a `Notify` while
//! the queue is empty instead of polling.
//!
//! Adding a workload whose uid is already queued coalesces: the queued
//! copy is replaced with the newer content and keeps its FIFO position.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::debug;

use crate::types::{Workload, WorkloadId};

#[derive(Default)]
struct QueueInner {
    /// Dequeue order.
    order: VecDeque<WorkloadId>,
    /// Latest content per queued uid.
    items: HashMap<WorkloadId, Workload>,
}

/// FIFO queue of pending workloads with a blocking consumer.
#[derive(Default)]
pub struct SchedulingQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl SchedulingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a workload. Never blocks.
    ///
    /// Returns `true` if the workload was newly queued and `false` if it
    /// replaced an already-queued copy with the same uid.
    pub fn add(&self, workload: Workload) -> bool {
        let uid = workload.uid.clone();
        let newly_queued = {
            let mut inner = self.lock();
            let replaced = inner.items.insert(uid.clone(), workload).is_some();
            if !replaced {
                inner.order.push_back(uid.clone());
            }
            !replaced
        };

        if newly_queued {
            debug!(workload = %uid, "workload queued");
            self.notify.notify_one();
        } else {
            debug!(workload = %uid, "queued workload updated in place");
        }
        newly_queued
    }

    /// Remove and return the oldest workload, waiting until one is
    /// available.
    pub async fn next_workload(&self) -> Workload {
        loop {
            if let Some(workload) = self.try_next() {
                return workload;
            }
            self.notify.notified().await;
        }
    }

    /// Remove and return the oldest workload without waiting.
    pub fn try_next(&self) -> Option<Workload> {
        let mut inner = self.lock();
        while let Some(uid) = inner.order.pop_front() {
            if let Some(workload) = inner.items.remove(&uid) {
                return Some(workload);
            }
        }
        None
    }

    pub fn contains(&self, uid: &WorkloadId) -> bool {
        self.lock().items.contains_key(uid)
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
