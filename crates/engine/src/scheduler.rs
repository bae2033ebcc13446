//! Flush timer and delayed retry re-appends.
//!
//! Both are spawned tokio tasks that sleep and then run a callback, so the
//! periodic flush and the retry backoff share one timing mechanism (and one
//! virtual clock in tests).

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use batchline_core::ItemId;
use tokio::task::JoinHandle;

use crate::sync::lock;

#[derive(Debug)]
struct Scheduled {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Owns the single outstanding flush timer and the pending retry tasks.
///
/// A task removes its own registration before running its callback, so
/// cancelling from inside a callback (a timer-driven flush cancels the timer)
/// never aborts the task that is doing the work.
#[derive(Debug, Default)]
pub struct FlushScheduler {
    next_generation: AtomicU64,
    flush_timer: Mutex<Option<Scheduled>>,
    retries: Mutex<HashMap<ItemId, Scheduled>>,
}

impl FlushScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// (Re)arm the flush timer. Any previously armed timer is cancelled.
    pub fn arm<F, Fut>(self: &Arc<Self>, delay: Duration, on_fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation();
        let weak = Arc::downgrade(self);

        // Spawn under the slot lock: the task cannot claim its slot before it is stored.
        let mut slot = lock(&self.flush_timer);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if claim(&weak, |s| {
                let mut slot = lock(&s.flush_timer);
                match slot.as_ref() {
                    Some(armed) if armed.generation == generation => slot.take().is_some(),
                    _ => false,
                }
            }) {
                on_fire().await;
            }
        });

        if let Some(previous) = slot.replace(Scheduled { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Cancel the flush timer, if armed.
    pub fn cancel(&self) {
        if let Some(armed) = lock(&self.flush_timer).take() {
            armed.handle.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        lock(&self.flush_timer).is_some()
    }

    /// Run `on_fire` after `delay`, keyed by item id.
    ///
    /// Scheduling the same id again replaces the earlier task.
    pub fn schedule_retry<F, Fut>(self: &Arc<Self>, id: ItemId, delay: Duration, on_fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation();
        let weak = Arc::downgrade(self);

        let mut retries = lock(&self.retries);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if claim(&weak, |s| {
                let mut retries = lock(&s.retries);
                match retries.get(&id) {
                    Some(pending) if pending.generation == generation => {
                        retries.remove(&id).is_some()
                    }
                    _ => false,
                }
            }) {
                on_fire().await;
            }
        });

        if let Some(previous) = retries.insert(id, Scheduled { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Cancel every pending retry, returning how many were dropped.
    pub fn cancel_retries(&self) -> usize {
        let pending: Vec<Scheduled> = lock(&self.retries).drain().map(|(_, s)| s).collect();
        for scheduled in &pending {
            scheduled.handle.abort();
        }
        pending.len()
    }

    pub fn pending_retries(&self) -> usize {
        lock(&self.retries).len()
    }

    fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.cancel();
        self.cancel_retries();
    }
}

/// Upgrade and try to claim a registration; `false` if the scheduler is gone
/// or the registration was cancelled/replaced in the meantime.
fn claim(weak: &Weak<FlushScheduler>, try_take: impl FnOnce(&FlushScheduler) -> bool) -> bool {
    match weak.upgrade() {
        Some(scheduler) => try_take(&scheduler),
        None => false,
    }
}
