//! Outcome of one processing call.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::BatchError;
use crate::id::ItemId;
use crate::item::BatchItem;

/// Partition of a processed batch.
///
/// Every item handed to one processing call ends up in exactly one of
/// `successful` or `failed`; every failed item has an entry in `errors`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult<T> {
    pub successful: Vec<BatchItem<T>>,
    /// Items scheduled for another attempt carry the `retry_count` of that
    /// attempt, not the one they were submitted with.
    pub failed: Vec<BatchItem<T>>,
    pub errors: HashMap<ItemId, BatchError>,
    /// Failed items of this flush that will not be retried again.
    pub exhausted: Vec<ItemId>,
}

impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        Self {
            successful: Vec::new(),
            failed: Vec::new(),
            errors: HashMap::new(),
            exhausted: Vec::new(),
        }
    }
}

impl<T> BatchResult<T> {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Everything went through.
    pub fn all_successful(items: Vec<BatchItem<T>>) -> Self {
        Self {
            successful: items,
            ..Self::default()
        }
    }

    /// Everything failed with the same error.
    pub fn all_failed(items: Vec<BatchItem<T>>, error: BatchError) -> Self {
        let errors = items.iter().map(|item| (item.id, error.clone())).collect();
        Self {
            failed: items,
            errors,
            ..Self::default()
        }
    }

    pub fn push_successful(&mut self, item: BatchItem<T>) {
        self.successful.push(item);
    }

    pub fn push_failed(&mut self, item: BatchItem<T>, error: BatchError) {
        self.errors.insert(item.id, error);
        self.failed.push(item);
    }

    pub fn len(&self) -> usize {
        self.successful.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successful.is_empty() && self.failed.is_empty()
    }

    /// Whether the item took part in this processing call.
    pub fn contains(&self, id: &ItemId) -> bool {
        self.successful.iter().chain(&self.failed).any(|item| &item.id == id)
    }

    pub fn succeeded(&self, id: &ItemId) -> bool {
        self.successful.iter().any(|item| &item.id == id)
    }

    pub fn error_for(&self, id: &ItemId) -> Option<&BatchError> {
        self.errors.get(id)
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            successful: self.successful.len(),
            failed: self.failed.len(),
            exhausted: self.exhausted.len(),
        }
    }
}

impl<T: Clone> BatchResult<T> {
    /// Normalise a handler's answer against the items actually submitted.
    ///
    /// Classification is by id and follows submission order; the submitted
    /// copy of each item is kept so retry state cannot be altered by the
    /// handler. Items reported both ways count as failed, unmentioned items
    /// fail with [`BatchError::Unreported`], failures without a reason get
    /// [`BatchError::Unspecified`] and ids that were never submitted are
    /// discarded. `exhausted` is reset; only the processor fills it in.
    pub fn reconcile(mut self, submitted: &[BatchItem<T>]) -> Self {
        let failed_ids: HashSet<ItemId> = self.failed.iter().map(|item| item.id).collect();
        let successful_ids: HashSet<ItemId> =
            self.successful.iter().map(|item| item.id).collect();

        let mut out = Self::default();

        for item in submitted {
            if failed_ids.contains(&item.id) {
                let error = self.errors.remove(&item.id).unwrap_or(BatchError::Unspecified);
                out.push_failed(item.clone(), error);
            } else if successful_ids.contains(&item.id) {
                out.push_successful(item.clone());
            } else {
                out.push_failed(item.clone(), BatchError::Unreported);
            }
        }

        out
    }
}

/// Counts-only view of a [`BatchResult`], independent of the payload type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub successful: usize,
    pub failed: usize,
    pub exhausted: usize,
}
