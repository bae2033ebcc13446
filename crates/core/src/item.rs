//! Queued item wrapper.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BatchError;
use crate::id::ItemId;

/// A payload waiting in (or travelling through) a batch queue.
///
/// The same `BatchItem` is re-enqueued on retry; only `retry_count` changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem<T> {
    pub id: ItemId,
    pub payload: T,
    /// Diagnostics/ordering only; items never expire.
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
}

impl<T> BatchItem<T> {
    pub fn new(payload: T) -> Self {
        Self {
            id: ItemId::new(),
            payload,
            enqueued_at: Utc::now(),
            retry_count: 0,
        }
    }

    /// Map the payload, keeping identity and retry state.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> BatchItem<U> {
        BatchItem {
            id: self.id,
            payload: f(self.payload),
            enqueued_at: self.enqueued_at,
            retry_count: self.retry_count,
        }
    }
}

/// An item dropped after exhausting its retries or losing its pending retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter<T> {
    pub item: BatchItem<T>,
    pub error: String,
    pub dropped_at: DateTime<Utc>,
}

impl<T> DeadLetter<T> {
    pub fn new(item: BatchItem<T>, error: &BatchError) -> Self {
        Self {
            item,
            error: error.to_string(),
            dropped_at: Utc::now(),
        }
    }
}
