//! Buffered analytics tracking.

use std::sync::Arc;

use async_trait::async_trait;
use batchline_core::{BatchConfig, BatchError, BatchItem, BatchResult, BatchSummary, ItemId, ProcessResult};
use batchline_engine::{BatchHandler, BatchProcessor};
use batchline_infra::{AnalyticsRecord, AnalyticsSink};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ProcessorKind;

/// Event name used by [`AnalyticsProcessor::identify`].
pub const IDENTIFY_EVENT: &str = "identify";

/// A tracked event, as queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub event: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AnalyticsEvent {
    fn into_record(self, item_id: ItemId, enqueued_at: DateTime<Utc>) -> AnalyticsRecord {
        AnalyticsRecord {
            event: self.event,
            properties: self.properties,
            user_id: self.user_id,
            timestamp: self.timestamp,
            batch_id: item_id.to_string(),
            batch_timestamp: enqueued_at,
        }
    }
}

struct InsertEvents {
    sink: Arc<dyn AnalyticsSink>,
}

#[async_trait]
impl BatchHandler<AnalyticsEvent> for InsertEvents {
    async fn process(&self, items: &[BatchItem<AnalyticsEvent>]) -> ProcessResult<AnalyticsEvent> {
        let records: Vec<AnalyticsRecord> = items
            .iter()
            .map(|item| item.payload.clone().into_record(item.id, item.enqueued_at))
            .collect();

        self.sink
            .insert_many(&records)
            .await
            .map_err(|err| BatchError::remote(err.to_string()))?;

        Ok(BatchResult::all_successful(items.to_vec()))
    }
}

/// Stateless event tracker; every batch becomes one sink insert.
#[derive(Clone)]
pub struct AnalyticsProcessor {
    processor: BatchProcessor<AnalyticsEvent>,
}

impl AnalyticsProcessor {
    pub fn new(sink: Arc<dyn AnalyticsSink>, config: BatchConfig) -> Self {
        Self {
            processor: BatchProcessor::new(
                ProcessorKind::Analytics.as_str(),
                config,
                InsertEvents { sink },
            ),
        }
    }

    pub fn with_defaults(sink: Arc<dyn AnalyticsSink>) -> Self {
        Self::new(sink, ProcessorKind::Analytics.default_config())
    }

    pub async fn track(&self, event: impl Into<String>, properties: Map<String, Value>) -> ItemId {
        self.processor
            .add(AnalyticsEvent {
                event: event.into(),
                properties,
                user_id: None,
                timestamp: Utc::now(),
            })
            .await
    }

    pub async fn identify(&self, user_id: impl Into<String>, properties: Map<String, Value>) -> ItemId {
        self.processor
            .add(AnalyticsEvent {
                event: IDENTIFY_EVENT.to_string(),
                properties,
                user_id: Some(user_id.into()),
                timestamp: Utc::now(),
            })
            .await
    }

    pub async fn flush(&self) -> BatchSummary {
        self.processor.flush().await.summary()
    }

    pub fn processor(&self) -> &BatchProcessor<AnalyticsEvent> {
        &self.processor
    }
}
