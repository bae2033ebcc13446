//! Cache-first question lookup.
//!
//! Misses are queued as ids and fetched with one multi-get per batch. Every
//! fetched question lands in a shared cache; callers read from that cache once
//! the flush carrying their id completes.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use batchline_core::{BatchConfig, BatchError, BatchItem, BatchResult, BatchSummary, ItemId, ProcessResult};
use batchline_engine::{BatchHandler, BatchProcessor};
use batchline_infra::{Question, QuestionStore};
use thiserror::Error;
use tracing::debug;

use crate::config::ProcessorKind;

type QuestionCache = Arc<RwLock<HashMap<String, Question>>>;

/// Why a question could not be returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuestionError {
    #[error("question not found: {0}")]
    NotFound(String),
    #[error("question fetch failed: {0}")]
    Fetch(#[from] BatchError),
}

struct FetchQuestions {
    store: Arc<dyn QuestionStore>,
    cache: QuestionCache,
}

#[async_trait]
impl BatchHandler<String> for FetchQuestions {
    async fn process(&self, items: &[BatchItem<String>]) -> ProcessResult<String> {
        let mut seen = HashSet::new();
        let ids: Vec<String> = items
            .iter()
            .filter(|item| seen.insert(item.payload.as_str()))
            .map(|item| item.payload.clone())
            .collect();

        let questions = self
            .store
            .fetch_many(&ids)
            .await
            .map_err(|err| BatchError::remote(err.to_string()))?;

        debug!(requested = ids.len(), found = questions.len(), "fetched questions");

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        for question in questions {
            cache.insert(question.id.clone(), question);
        }

        Ok(BatchResult::all_successful(items.to_vec()))
    }
}

/// Batched, cached question fetching.
#[derive(Clone)]
pub struct QuestionProcessor {
    processor: BatchProcessor<String>,
    cache: QuestionCache,
}

impl QuestionProcessor {
    pub fn new(store: Arc<dyn QuestionStore>, config: BatchConfig) -> Self {
        let cache = QuestionCache::default();
        let handler = FetchQuestions {
            store,
            cache: cache.clone(),
        };
        Self {
            processor: BatchProcessor::new(ProcessorKind::Questions.as_str(), config, handler),
            cache,
        }
    }

    pub fn with_defaults(store: Arc<dyn QuestionStore>) -> Self {
        Self::new(store, ProcessorKind::Questions.default_config())
    }

    /// Return the question from cache, or queue it and flush until it was fetched.
    ///
    /// A missing question is [`QuestionError::NotFound`]; a failed fetch is
    /// [`QuestionError::Fetch`] (the id is still retried in the background).
    pub async fn fetch_question(&self, id: impl Into<String>) -> Result<Question, QuestionError> {
        let id = id.into();
        if let Some(question) = self.cached(&id) {
            return Ok(question);
        }

        let (item_id, result) = self.processor.submit(id.clone()).await;

        if let Some(question) = self.cached(&id) {
            return Ok(question);
        }
        match result.error_for(&item_id) {
            Some(error) => Err(QuestionError::Fetch(error.clone())),
            None => Err(QuestionError::NotFound(id)),
        }
    }

    /// Queue uncached ids without waiting for them.
    pub async fn prefetch<I, S>(&self, ids: I) -> Vec<ItemId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let missing: Vec<String> = ids
            .into_iter()
            .map(Into::into)
            .filter(|id| !self.is_cached(id))
            .collect();
        self.processor.add_batch(missing).await
    }

    pub fn cached(&self, id: &str) -> Option<Question> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn is_cached(&self, id: &str) -> bool {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn clear_cache(&self) {
        self.cache.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub async fn flush(&self) -> BatchSummary {
        self.processor.flush().await.summary()
    }

    pub fn processor(&self) -> &BatchProcessor<String> {
        &self.processor
    }
}
