//! Failure injection for the in-memory stores.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::error::StoreError;

/// Decides whether the next store call fails.
///
/// Queued one-shot failures are consumed first; a sticky failure applies to
/// every call until [`recover`](Self::recover).
#[derive(Debug, Default)]
pub struct FailureInjector {
    queued: Mutex<VecDeque<StoreError>>,
    sticky: Mutex<Option<StoreError>>,
}

impl FailureInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call with `error`. Calls queue up.
    pub fn fail_next(&self, error: StoreError) {
        self.queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }

    /// Fail every call with `error` until recovered.
    pub fn fail_always(&self, error: StoreError) {
        *self.sticky.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    /// Drop all pending and sticky failures.
    pub fn recover(&self) {
        self.queued.lock().unwrap_or_else(PoisonError::into_inner).clear();
        *self.sticky.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub(crate) fn check(&self) -> Result<(), StoreError> {
        if let Some(error) = self
            .queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        {
            return Err(error);
        }
        match self.sticky.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
