//! Analytics event sink.

pub mod in_memory;

pub use in_memory::InMemoryAnalyticsSink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;

/// One analytics row as written to the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsRecord {
    pub event: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// When the event was recorded by the caller.
    pub timestamp: DateTime<Utc>,
    /// Id of the queued item that carried this event.
    pub batch_id: String,
    /// When that item entered the queue.
    pub batch_timestamp: DateTime<Utc>,
}

/// Batch insert of analytics records.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    /// Insert all records or none.
    async fn insert_many(&self, records: &[AnalyticsRecord]) -> Result<(), StoreError>;
}
