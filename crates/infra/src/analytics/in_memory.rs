use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use super::{AnalyticsRecord, AnalyticsSink};
use crate::error::StoreError;
use crate::failure::FailureInjector;

/// In-memory analytics sink for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAnalyticsSink {
    records: RwLock<Vec<AnalyticsRecord>>,
    inserts: AtomicUsize,
    failures: FailureInjector,
}

impl InMemoryAnalyticsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Everything inserted so far, in insertion order.
    pub fn records(&self) -> Vec<AnalyticsRecord> {
        self.records.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of `insert_many` calls, failed ones included.
    pub fn insert_calls(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> &FailureInjector {
        &self.failures
    }
}

#[async_trait]
impl AnalyticsSink for InMemoryAnalyticsSink {
    async fn insert_many(&self, records: &[AnalyticsRecord]) -> Result<(), StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.failures.check()?;

        self.records
            .write()
            .map_err(|_| StoreError::poisoned())?
            .extend_from_slice(records);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn record(event: &str) -> AnalyticsRecord {
        AnalyticsRecord {
            event: event.to_string(),
            properties: Default::default(),
            user_id: None,
            timestamp: Utc::now(),
            batch_id: format!("batch-{event}"),
            batch_timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn failed_insert_writes_nothing() {
        let sink = InMemoryAnalyticsSink::new();
        sink.failures().fail_next(StoreError::rejected("quota"));

        assert!(sink.insert_many(&[record("a"), record("b")]).await.is_err());
        assert!(sink.records().is_empty());

        sink.insert_many(&[record("a"), record("b")]).await.unwrap();
        assert_eq!(sink.records().len(), 2);
        assert_eq!(sink.insert_calls(), 2);
    }

    #[test]
    fn empty_optional_fields_are_omitted() {
        let json = serde_json::to_value(record("view")).unwrap();
        let object = json.as_object().unwrap();
        assert!(!object.contains_key("properties"));
        assert!(!object.contains_key("user_id"));
        assert_eq!(object["batch_id"], "batch-view");
    }
}
