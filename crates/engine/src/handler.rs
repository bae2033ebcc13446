//! The injected processing function.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use batchline_core::{BatchItem, ProcessResult};

/// Processes one drained batch.
///
/// Implementations perform their own I/O. They should put every input item in
/// either `successful` or `failed` and key an error by item id for each
/// failure; the processor repairs answers that do not (see
/// [`batchline_core::BatchResult::reconcile`]). Returning `Err` fails the
/// whole call.
#[async_trait]
pub trait BatchHandler<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    async fn process(&self, items: &[BatchItem<T>]) -> ProcessResult<T>;
}

#[async_trait]
impl<T, H> BatchHandler<T> for Arc<H>
where
    T: Send + Sync + 'static,
    H: BatchHandler<T> + ?Sized,
{
    async fn process(&self, items: &[BatchItem<T>]) -> ProcessResult<T> {
        (**self).process(items).await
    }
}

/// Adapter turning an async closure over an owned batch into a [`BatchHandler`].
pub struct FnHandler<F> {
    f: F,
}

/// Wrap `f` as a handler. The closure receives a copy of the batch.
pub fn handler_fn<F>(f: F) -> FnHandler<F> {
    FnHandler { f }
}

#[async_trait]
impl<T, F, Fut> BatchHandler<T> for FnHandler<F>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(Vec<BatchItem<T>>) -> Fut + Send + Sync,
    Fut: Future<Output = ProcessResult<T>> + Send + 'static,
{
    async fn process(&self, items: &[BatchItem<T>]) -> ProcessResult<T> {
        (self.f)(items.to_vec()).await
    }
}

impl<F> core::fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}
