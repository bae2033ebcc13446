//! Process-wide holder of the specialized processors.
//!
//! The registry is constructed explicitly with its stores and configuration
//! and passed to whoever needs it. Each processor is created on first use.

use std::sync::{Arc, Mutex, PoisonError};

use batchline_core::BatchSummary;
use batchline_infra::{AnalyticsSink, ProfileStore, QuestionStore};
use futures::future::{BoxFuture, FutureExt, join_all};
use tracing::info;

use crate::analytics::AnalyticsProcessor;
use crate::config::{ProcessorKind, RegistryConfig};
use crate::question::QuestionProcessor;
use crate::user_sync::UserDataSyncProcessor;

/// Remote stores shared by the processors.
#[derive(Clone)]
pub struct Stores {
    pub questions: Arc<dyn QuestionStore>,
    pub analytics: Arc<dyn AnalyticsSink>,
    pub profiles: Arc<dyn ProfileStore>,
}

/// Lazily created processors plus whole-registry flush and shutdown.
pub struct ProcessorRegistry {
    stores: Stores,
    config: RegistryConfig,
    questions: Mutex<Option<Arc<QuestionProcessor>>>,
    analytics: Mutex<Option<Arc<AnalyticsProcessor>>>,
    user_sync: Mutex<Option<Arc<UserDataSyncProcessor>>>,
}

fn get_or_create<P>(slot: &Mutex<Option<Arc<P>>>, kind: ProcessorKind, create: impl FnOnce() -> P) -> Arc<P> {
    let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
    guard
        .get_or_insert_with(|| {
            info!(processor = %kind, "creating processor");
            Arc::new(create())
        })
        .clone()
}

fn current<P>(slot: &Mutex<Option<Arc<P>>>) -> Option<Arc<P>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

impl ProcessorRegistry {
    pub fn new(stores: Stores, config: RegistryConfig) -> Self {
        Self {
            stores,
            config,
            questions: Mutex::new(None),
            analytics: Mutex::new(None),
            user_sync: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn questions(&self) -> Arc<QuestionProcessor> {
        get_or_create(&self.questions, ProcessorKind::Questions, || {
            QuestionProcessor::new(self.stores.questions.clone(), self.config.questions.clone())
        })
    }

    pub fn analytics(&self) -> Arc<AnalyticsProcessor> {
        get_or_create(&self.analytics, ProcessorKind::Analytics, || {
            AnalyticsProcessor::new(self.stores.analytics.clone(), self.config.analytics.clone())
        })
    }

    pub fn user_sync(&self) -> Arc<UserDataSyncProcessor> {
        get_or_create(&self.user_sync, ProcessorKind::UserSync, || {
            UserDataSyncProcessor::new(self.stores.profiles.clone(), self.config.user_sync.clone())
        })
    }

    /// Kinds whose processor has been created, in [`ProcessorKind::ALL`] order.
    pub fn created(&self) -> Vec<ProcessorKind> {
        let mut kinds = Vec::new();
        if current(&self.questions).is_some() {
            kinds.push(ProcessorKind::Questions);
        }
        if current(&self.analytics).is_some() {
            kinds.push(ProcessorKind::Analytics);
        }
        if current(&self.user_sync).is_some() {
            kinds.push(ProcessorKind::UserSync);
        }
        kinds
    }

    /// Flush every created processor concurrently and wait for all of them.
    ///
    /// Processors that were never used are not created by this call.
    pub async fn flush_all(&self) -> Vec<(ProcessorKind, BatchSummary)> {
        let mut flushes: Vec<BoxFuture<'static, (ProcessorKind, BatchSummary)>> = Vec::new();

        if let Some(p) = current(&self.questions) {
            flushes.push(async move { (ProcessorKind::Questions, p.flush().await) }.boxed());
        }
        if let Some(p) = current(&self.analytics) {
            flushes.push(async move { (ProcessorKind::Analytics, p.flush().await) }.boxed());
        }
        if let Some(p) = current(&self.user_sync) {
            flushes.push(async move { (ProcessorKind::UserSync, p.flush().await) }.boxed());
        }

        let summaries = join_all(flushes).await;
        info!(processors = summaries.len(), "flushed all processors");
        summaries
    }

    /// Give pending retries their last attempt, `flush_all`, then destroy
    /// every created processor.
    ///
    /// Items still failing after that attempt end up in their processor's
    /// dead letters.
    pub async fn shutdown(&self) -> Vec<(ProcessorKind, BatchSummary)> {
        let mut expedited = 0;
        if let Some(p) = current(&self.questions) {
            expedited += p.processor().retry_now();
        }
        if let Some(p) = current(&self.analytics) {
            expedited += p.processor().retry_now();
        }
        if let Some(p) = current(&self.user_sync) {
            expedited += p.processor().retry_now();
        }
        if expedited > 0 {
            info!(items = expedited, "pending retries moved ahead of shutdown flush");
        }

        let summaries = self.flush_all().await;

        if let Some(p) = current(&self.questions) {
            p.processor().destroy();
        }
        if let Some(p) = current(&self.analytics) {
            p.processor().destroy();
        }
        if let Some(p) = current(&self.user_sync) {
            p.processor().destroy();
        }

        info!("processor registry shut down");
        summaries
    }
}
