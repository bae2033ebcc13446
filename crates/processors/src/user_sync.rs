//! Per-user profile synchronization.
//!
//! Each flush groups its updates by user and folds them, in enqueue order,
//! into a single [`ProfilePatch`]. One patch is sent per user; a user's updates
//! succeed or fail together.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use batchline_core::{BatchConfig, BatchError, BatchItem, BatchResult, BatchSummary, ItemId, ProcessResult};
use batchline_engine::{BatchHandler, BatchProcessor};
use batchline_infra::{ProfilePatch, ProfileStore, UpdateOperation};
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use tracing::{debug, warn};

use crate::config::ProcessorKind;

/// One field change for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDataUpdate {
    pub user_id: String,
    pub field: String,
    #[serde(flatten)]
    pub operation: UpdateOperation,
}

impl UserDataUpdate {
    pub fn new(user_id: impl Into<String>, field: impl Into<String>, operation: UpdateOperation) -> Self {
        Self {
            user_id: user_id.into(),
            field: field.into(),
            operation,
        }
    }

    pub fn set(user_id: impl Into<String>, field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(user_id, field, UpdateOperation::Set(value.into()))
    }

    pub fn increment(user_id: impl Into<String>, field: impl Into<String>, by: impl Into<Number>) -> Self {
        Self::new(user_id, field, UpdateOperation::Increment(by.into()))
    }

    pub fn append(user_id: impl Into<String>, field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(user_id, field, UpdateOperation::Append(value.into()))
    }
}

/// Updates of one user within a batch, in enqueue order.
struct UserGroup<'a> {
    user_id: &'a str,
    items: Vec<&'a BatchItem<UserDataUpdate>>,
}

impl UserGroup<'_> {
    fn patch(&self) -> ProfilePatch {
        let mut patch = ProfilePatch::new();
        for item in &self.items {
            patch.push(item.payload.field.clone(), item.payload.operation.clone());
        }
        patch
    }
}

/// Group items by user, users ordered by first appearance.
fn group_by_user(items: &[BatchItem<UserDataUpdate>]) -> Vec<UserGroup<'_>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<UserGroup<'_>> = Vec::new();

    for item in items {
        let user_id = item.payload.user_id.as_str();
        let slot = *index.entry(user_id).or_insert_with(|| {
            groups.push(UserGroup {
                user_id,
                items: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].items.push(item);
    }

    groups
}

struct SyncProfiles {
    store: Arc<dyn ProfileStore>,
}

#[async_trait]
impl BatchHandler<UserDataUpdate> for SyncProfiles {
    async fn process(&self, items: &[BatchItem<UserDataUpdate>]) -> ProcessResult<UserDataUpdate> {
        let groups = group_by_user(items);
        debug!(users = groups.len(), updates = items.len(), "syncing user data");

        let outcomes = join_all(groups.iter().map(|group| async move {
            let patch = group.patch();
            self.store.apply_patch(group.user_id, &patch).await
        }))
        .await;

        let mut result = BatchResult::empty();
        for (group, outcome) in groups.iter().zip(outcomes) {
            match outcome {
                Ok(()) => {
                    for item in &group.items {
                        result.push_successful((*item).clone());
                    }
                }
                Err(err) => {
                    warn!(user_id = %group.user_id, updates = group.items.len(), error = %err, "profile update failed");
                    let error = BatchError::remote(err.to_string());
                    for item in &group.items {
                        result.push_failed((*item).clone(), error.clone());
                    }
                }
            }
        }

        Ok(result)
    }
}

/// Batched user profile updates.
#[derive(Clone)]
pub struct UserDataSyncProcessor {
    processor: BatchProcessor<UserDataUpdate>,
}

impl UserDataSyncProcessor {
    pub fn new(store: Arc<dyn ProfileStore>, config: BatchConfig) -> Self {
        Self {
            processor: BatchProcessor::new(
                ProcessorKind::UserSync.as_str(),
                config,
                SyncProfiles { store },
            ),
        }
    }

    pub fn with_defaults(store: Arc<dyn ProfileStore>) -> Self {
        Self::new(store, ProcessorKind::UserSync.default_config())
    }

    pub async fn update_user_data(&self, update: UserDataUpdate) -> ItemId {
        self.processor.add(update).await
    }

    pub async fn update_many<I>(&self, updates: I) -> Vec<ItemId>
    where
        I: IntoIterator<Item = UserDataUpdate>,
    {
        self.processor.add_batch(updates).await
    }

    /// Queue the usual progress fields (`xp`, `level`, `last_updated`) for a user.
    pub async fn sync_user_progress(&self, user_id: &str, xp: u64, level: u32) -> Vec<ItemId> {
        self.update_many([
            UserDataUpdate::set(user_id, "xp", xp),
            UserDataUpdate::set(user_id, "level", level),
            UserDataUpdate::set(user_id, "last_updated", Utc::now().to_rfc3339()),
        ])
        .await
    }

    pub async fn flush(&self) -> BatchSummary {
        self.processor.flush().await.summary()
    }

    pub fn processor(&self) -> &BatchProcessor<UserDataUpdate> {
        &self.processor
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn items(updates: Vec<UserDataUpdate>) -> Vec<BatchItem<UserDataUpdate>> {
        updates.into_iter().map(BatchItem::new).collect()
    }

    #[test]
    fn grouping_keeps_first_appearance_and_enqueue_order() {
        let batch = items(vec![
            UserDataUpdate::set("b", "level", 2),
            UserDataUpdate::increment("a", "xp", 5),
            UserDataUpdate::append("b", "badges", "first"),
            UserDataUpdate::set("a", "name", "ada"),
        ]);

        let groups = group_by_user(&batch);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].user_id, "b");
        assert_eq!(groups[1].user_id, "a");
        let patch = groups[0].patch();
        let fields: Vec<&str> = patch.changes.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["level", "badges"]);
        assert_eq!(
            groups[1].patch().changes[1].operation,
            UpdateOperation::Set(json!("ada"))
        );
    }

    #[test]
    fn update_deserializes_from_flat_json() {
        let update: UserDataUpdate = serde_json::from_value(json!({
            "user_id": "u1",
            "field": "xp",
            "operation": "increment",
            "value": 25
        }))
        .unwrap();

        assert_eq!(update, UserDataUpdate::increment("u1", "xp", 25));
    }
}
