//! Batch processor: queue + scheduler + retry orchestration.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use batchline_core::{
    BatchConfig, BatchError, BatchItem, BatchResult, DeadLetter, ItemId, ProcessResult,
};
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, error, info, warn};

use crate::handler::BatchHandler;
use crate::queue::BatchQueue;
use crate::scheduler::FlushScheduler;
use crate::stats::ProcessorStats;
use crate::sync::lock;

type SharedFlush<T> = Shared<BoxFuture<'static, BatchResult<T>>>;

struct InFlight<T> {
    seq: u64,
    result: SharedFlush<T>,
}

struct Inner<T>
where
    T: Send + Sync + 'static,
{
    name: String,
    config: BatchConfig,
    handler: Arc<dyn BatchHandler<T>>,
    queue: BatchQueue<T>,
    scheduler: Arc<FlushScheduler>,
    in_flight: Mutex<Option<InFlight<T>>>,
    flush_seq: AtomicU64,
    stats: Mutex<ProcessorStats>,
    dead_letters: Mutex<VecDeque<DeadLetter<T>>>,
    /// Items waiting out their backoff, in the order they failed. A retry task
    /// re-appends its item only if it can still take it from here.
    retrying: Mutex<Vec<BatchItem<T>>>,
}

/// Accumulates payloads and hands them to a [`BatchHandler`] in bounded batches.
///
/// Flushes happen when the queue reaches `max_batch_size` (from inside
/// `add`), when the debounced timer fires `flush_interval` after the last
/// add, or on an explicit [`flush`](Self::flush). At most one processing call
/// is in flight; concurrent flushes share its result. Failed items are
/// re-appended after `retry_delay * 2^(retry_count-1)` until `retry_attempts`
/// is spent, then dropped and reported.
///
/// Cheap to clone; clones share the same queue. Must be used inside a tokio
/// runtime.
pub struct BatchProcessor<T>
where
    T: Send + Sync + 'static,
{
    inner: Arc<Inner<T>>,
}

impl<T> Clone for BatchProcessor<T>
where
    T: Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> core::fmt::Debug for BatchProcessor<T>
where
    T: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BatchProcessor")
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .field("queue_size", &self.inner.queue.len())
            .finish_non_exhaustive()
    }
}

impl<T> BatchProcessor<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new<H>(name: impl Into<String>, config: BatchConfig, handler: H) -> Self
    where
        H: BatchHandler<T> + 'static,
    {
        Self::with_handler(name, config, Arc::new(handler))
    }

    pub fn with_handler(
        name: impl Into<String>,
        config: BatchConfig,
        handler: Arc<dyn BatchHandler<T>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                config,
                handler,
                queue: BatchQueue::new(),
                scheduler: FlushScheduler::new(),
                in_flight: Mutex::new(None),
                flush_seq: AtomicU64::new(0),
                stats: Mutex::new(ProcessorStats::default()),
                dead_letters: Mutex::new(VecDeque::new()),
                retrying: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &BatchConfig {
        &self.inner.config
    }

    /// Queue a payload.
    ///
    /// If this fills the batch the call awaits the flush it triggers;
    /// otherwise it (re)arms the flush timer and returns immediately.
    pub async fn add(&self, payload: T) -> ItemId {
        let item = BatchItem::new(payload);
        let id = item.id;
        let len = self.inner.queue.push(item);

        if len >= self.inner.config.max_batch_size {
            debug!(processor = %self.inner.name, queue_size = len, "batch size reached");
            self.inner.flush().await;
        } else {
            self.inner.arm_timer();
        }

        id
    }

    /// Queue payloads one by one; each may trigger its own size flush.
    pub async fn add_batch<I>(&self, payloads: I) -> Vec<ItemId>
    where
        I: IntoIterator<Item = T>,
    {
        let mut ids = Vec::new();
        for payload in payloads {
            ids.push(self.add(payload).await);
        }
        ids
    }

    /// Queue a payload and keep flushing until it has been attempted.
    ///
    /// Returns the result of the flush that carried the item. The item is
    /// absent from it only if another caller's flush picked it up and
    /// finished first.
    pub async fn submit(&self, payload: T) -> (ItemId, BatchResult<T>) {
        let item = BatchItem::new(payload);
        let id = item.id;
        self.inner.queue.push(item);

        loop {
            let result = self.inner.flush().await;
            if result.contains(&id) || !self.inner.queue.contains(&id) {
                return (id, result);
            }
        }
    }

    /// Process everything queued now.
    ///
    /// Joins the in-flight flush if there is one (its result, not a new
    /// batch). An empty queue yields an empty result without calling the
    /// handler.
    pub async fn flush(&self) -> BatchResult<T> {
        self.inner.flush().await
    }

    /// Drop queued items and cancel the flush timer.
    ///
    /// An in-flight flush and already scheduled retries are unaffected.
    pub fn clear(&self) {
        let dropped = self.inner.queue.clear();
        self.inner.scheduler.cancel();
        if dropped > 0 {
            debug!(processor = %self.inner.name, dropped, "cleared queue");
        }
    }

    /// `clear` plus cancelling pending retries. Safe to call repeatedly.
    ///
    /// Cancelled retries are dead-lettered with [`BatchError::Cancelled`] and
    /// counted as dropped. In-flight processing calls run to completion.
    pub fn destroy(&self) {
        self.clear();
        let cancelled = self.inner.cancel_retries();
        info!(processor = %self.inner.name, cancelled_retries = cancelled, "processor destroyed");
    }

    /// Skip the backoff of every pending retry: re-append those items now.
    ///
    /// Items re-enter in the order they failed and the flush timer is armed.
    /// Returns how many items were moved.
    pub fn retry_now(&self) -> usize {
        self.inner.scheduler.cancel_retries();
        let items = std::mem::take(&mut *lock(&self.inner.retrying));
        if items.is_empty() {
            return 0;
        }

        let moved = items.len();
        for item in items {
            self.inner.queue.push(item);
        }
        self.inner.arm_timer();
        debug!(processor = %self.inner.name, moved, "pending retries re-appended early");
        moved
    }

    /// Pending items, excluding any in the in-flight batch.
    pub fn queue_size(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn is_flushing(&self) -> bool {
        lock(&self.inner.in_flight).is_some()
    }

    pub fn pending_retries(&self) -> usize {
        lock(&self.inner.retrying).len()
    }

    pub fn stats(&self) -> ProcessorStats {
        lock(&self.inner.stats).clone()
    }

    /// Items dropped after exhausting retries (or cancelled by `destroy`),
    /// oldest first. Empties the buffer.
    pub fn take_dead_letters(&self) -> Vec<DeadLetter<T>> {
        lock(&self.inner.dead_letters).drain(..).collect()
    }
}

impl<T> Inner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn arm_timer(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.scheduler.arm(self.config.flush_interval, move || async move {
            if let Some(inner) = weak.upgrade() {
                inner.flush().await;
            }
        });
    }

    async fn flush(self: &Arc<Self>) -> BatchResult<T> {
        let pending = {
            let mut slot = lock(&self.in_flight);
            match slot.as_ref() {
                Some(in_flight) => {
                    debug!(processor = %self.name, "joining in-flight flush");
                    in_flight.result.clone()
                }
                None => {
                    let items = self.queue.drain();
                    if items.is_empty() {
                        return BatchResult::empty();
                    }
                    self.scheduler.cancel();

                    let seq = self.flush_seq.fetch_add(1, Ordering::Relaxed) + 1;
                    let items = Arc::new(items);
                    let task = tokio::spawn({
                        let inner = Arc::clone(self);
                        let items = Arc::clone(&items);
                        async move {
                            let run = Arc::clone(&inner).run_flush(seq, Arc::clone(&items));
                            AssertUnwindSafe(run).catch_unwind().await.unwrap_or_else(|panic| {
                                inner.abandon_flush(seq, &items, panic_message(panic.as_ref()))
                            })
                        }
                    });
                    let weak = Arc::downgrade(self);
                    let result: SharedFlush<T> = async move {
                        match task.await {
                            Ok(result) => result,
                            Err(err) => match weak.upgrade() {
                                Some(inner) => inner.abandon_flush(seq, &items, err.to_string()),
                                None => BatchResult::all_failed(
                                    items.to_vec(),
                                    BatchError::panicked(err.to_string()),
                                ),
                            },
                        }
                    }
                    .boxed()
                    .shared();

                    *slot = Some(InFlight {
                        seq,
                        result: result.clone(),
                    });
                    result
                }
            }
        };

        pending.await
    }

    async fn run_flush(self: Arc<Self>, seq: u64, items: Arc<Vec<BatchItem<T>>>) -> BatchResult<T> {
        let started = Instant::now();
        let batch_size = items.len();
        debug!(processor = %self.name, flush = seq, batch_size, "flushing batch");

        let outcome = self.invoke(&items).await;
        let mut result = match outcome {
            Ok(answer) => answer.reconcile(&items),
            Err(error) => {
                warn!(
                    processor = %self.name,
                    flush = seq,
                    batch_size,
                    error = %error,
                    "processing call failed; whole batch marked failed"
                );
                lock(&self.stats).batch_failures += 1;
                BatchResult::all_failed(items.to_vec(), error)
            }
        };

        let retried = self.route_failures(&mut result);

        {
            let mut stats = lock(&self.stats);
            stats.flushes += 1;
            stats.items_processed += batch_size as u64;
            stats.items_succeeded += result.successful.len() as u64;
            stats.items_failed += result.failed.len() as u64;
            stats.items_retried += retried as u64;
            stats.items_dropped += result.exhausted.len() as u64;
        }

        self.finish_flush(seq);

        debug!(
            processor = %self.name,
            flush = seq,
            successful = result.successful.len(),
            failed = result.failed.len(),
            retried,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "flush complete"
        );

        result
    }

    /// Release the in-flight slot if it still belongs to flush `seq`.
    fn finish_flush(self: &Arc<Self>, seq: u64) {
        {
            let mut slot = lock(&self.in_flight);
            if slot.as_ref().is_some_and(|f| f.seq == seq) {
                *slot = None;
            }
        }

        // Items that arrived while this flush ran may have found no timer armed.
        if !self.queue.is_empty() && !self.scheduler.is_armed() {
            self.arm_timer();
        }
    }

    /// Settle a flush whose task died outside the handler call.
    ///
    /// The whole batch fails with [`BatchError::Panicked`] and is dead-lettered
    /// without retries.
    fn abandon_flush(
        self: &Arc<Self>,
        seq: u64,
        items: &[BatchItem<T>],
        reason: String,
    ) -> BatchResult<T> {
        error!(
            processor = %self.name,
            flush = seq,
            batch_size = items.len(),
            reason = %reason,
            "flush task died; batch dropped"
        );

        let error = BatchError::panicked(reason);
        let mut result = BatchResult::all_failed(items.to_vec(), error.clone());
        for item in &result.failed {
            self.record_dead_letter(DeadLetter::new(item.clone(), &error));
        }
        result.exhausted = result.failed.iter().map(|item| item.id).collect();

        {
            let mut stats = lock(&self.stats);
            stats.flushes += 1;
            stats.batch_failures += 1;
            stats.items_processed += items.len() as u64;
            stats.items_failed += items.len() as u64;
            stats.items_dropped += items.len() as u64;
        }

        self.finish_flush(seq);
        result
    }

    /// Call the handler, turning panics and timeouts into batch-level errors.
    async fn invoke(&self, items: &[BatchItem<T>]) -> ProcessResult<T> {
        let call = AssertUnwindSafe(self.handler.process(items)).catch_unwind();

        let outcome = match self.config.process_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(BatchError::Timeout(limit)),
            },
            None => call.await,
        };

        outcome.unwrap_or_else(|panic| {
            let message = panic_message(panic.as_ref());
            error!(processor = %self.name, panic = %message, "processing function panicked");
            Err(BatchError::panicked(message))
        })
    }

    /// Schedule retries for failed items that still have budget; record the rest.
    fn route_failures(self: &Arc<Self>, result: &mut BatchResult<T>) -> usize {
        let mut retried = 0;
        let mut exhausted = Vec::new();

        for item in result.failed.iter_mut() {
            if self.config.should_retry(item.retry_count) {
                item.retry_count += 1;
                let delay = self.config.retry_backoff(item.retry_count);
                debug!(
                    processor = %self.name,
                    item_id = %item.id,
                    retry_count = item.retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "scheduling retry"
                );
                self.schedule_retry(item.clone(), delay);
                retried += 1;
            } else {
                let error = result.errors.get(&item.id).cloned().unwrap_or(BatchError::Unspecified);
                warn!(
                    processor = %self.name,
                    item_id = %item.id,
                    attempts = item.retry_count + 1,
                    error = %error,
                    "retries exhausted; dropping item"
                );
                exhausted.push(item.id);
                self.record_dead_letter(DeadLetter::new(item.clone(), &error));
            }
        }

        result.exhausted.extend(exhausted);
        retried
    }

    fn schedule_retry(self: &Arc<Self>, item: BatchItem<T>, delay: std::time::Duration) {
        let id = item.id;
        lock(&self.retrying).push(item);

        let weak = Arc::downgrade(self);
        self.scheduler.schedule_retry(id, delay, move || async move {
            if let Some(inner) = weak.upgrade() {
                let due = {
                    let mut retrying = lock(&inner.retrying);
                    retrying.iter().position(|item| item.id == id).map(|at| retrying.remove(at))
                };
                if let Some(item) = due {
                    inner.queue.push(item);
                    inner.arm_timer();
                }
            }
        });
    }

    /// Cancel pending retries and dead-letter their items. Returns how many.
    fn cancel_retries(&self) -> usize {
        self.scheduler.cancel_retries();
        let cancelled = std::mem::take(&mut *lock(&self.retrying));
        if cancelled.is_empty() {
            return 0;
        }

        let count = cancelled.len();
        for item in cancelled {
            warn!(
                processor = %self.name,
                item_id = %item.id,
                retry_count = item.retry_count,
                "pending retry cancelled; dropping item"
            );
            self.record_dead_letter(DeadLetter::new(item, &BatchError::Cancelled));
        }
        lock(&self.stats).items_dropped += count as u64;
        count
    }

    fn record_dead_letter(&self, letter: DeadLetter<T>) {
        let capacity = self.config.dead_letter_capacity;
        if capacity == 0 {
            return;
        }
        let mut letters = lock(&self.dead_letters);
        while letters.len() >= capacity {
            letters.pop_front();
        }
        letters.push_back(letter);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
