//! Question lookup by id.

pub mod in_memory;

pub use in_memory::InMemoryQuestionStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;

/// A question record. Everything but the id is opaque to the batch layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Question {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Id-based multi-get.
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Fetch every known question among `ids`.
    ///
    /// Unknown ids are simply absent from the answer; order is unspecified.
    async fn fetch_many(&self, ids: &[String]) -> Result<Vec<Question>, StoreError>;
}
