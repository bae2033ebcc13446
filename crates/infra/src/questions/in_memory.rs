use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;

use super::{Question, QuestionStore};
use crate::error::StoreError;
use crate::failure::FailureInjector;

/// In-memory question store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryQuestionStore {
    questions: RwLock<HashMap<String, Question>>,
    calls: Mutex<Vec<Vec<String>>>,
    failures: FailureInjector,
}

impl InMemoryQuestionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn with_questions(questions: impl IntoIterator<Item = Question>) -> Self {
        let store = Self::new();
        for question in questions {
            store.insert(question);
        }
        store
    }

    pub fn insert(&self, question: Question) {
        self.questions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(question.id.clone(), question);
    }

    /// Ids requested by each `fetch_many` call, in call order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn failures(&self) -> &FailureInjector {
        &self.failures
    }
}

#[async_trait]
impl QuestionStore for InMemoryQuestionStore {
    async fn fetch_many(&self, ids: &[String]) -> Result<Vec<Question>, StoreError> {
        self.calls
            .lock()
            .map_err(|_| StoreError::poisoned())?
            .push(ids.to_vec());
        self.failures.check()?;

        let questions = self.questions.read().map_err(|_| StoreError::poisoned())?;
        Ok(ids.iter().filter_map(|id| questions.get(id).cloned()).collect())
    }
}
