use std::sync::Arc;

use batchline_core::BatchConfig;
use batchline_infra::{InMemoryProfileStore, StoreError, UpdateOperation};
use batchline_processors::{UserDataSyncProcessor, UserDataUpdate};
use serde_json::json;

#[tokio::test(start_paused = true)]
async fn one_remote_update_per_user() {
    let store = Arc::new(InMemoryProfileStore::new());
    let sync = UserDataSyncProcessor::with_defaults(store.clone());

    sync.update_user_data(UserDataUpdate::set("A", "level", 3)).await;
    sync.update_user_data(UserDataUpdate::set("B", "level", 1)).await;
    sync.update_user_data(UserDataUpdate::increment("A", "xp", 40)).await;
    let summary = sync.flush().await;

    assert_eq!(summary.successful, 3);
    let calls = store.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, "A");
    assert_eq!(calls[0].1.len(), 2);
    assert_eq!(calls[1].0, "B");
    assert_eq!(calls[1].1.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn operations_fold_in_enqueue_order() {
    let store = Arc::new(InMemoryProfileStore::new());
    store.insert_profile("u1", json!({ "xp": 100, "badges": ["starter"] }).as_object().cloned().unwrap());
    let sync = UserDataSyncProcessor::with_defaults(store.clone());

    sync.update_many([
        UserDataUpdate::increment("u1", "xp", 25),
        UserDataUpdate::append("u1", "badges", "streak-7"),
        UserDataUpdate::set("u1", "title", "Scholar"),
        UserDataUpdate::increment("u1", "xp", 5),
    ])
    .await;
    sync.flush().await;

    let profile = store.profile("u1").unwrap();
    assert_eq!(profile["xp"], json!(130));
    assert_eq!(profile["badges"], json!(["starter", "streak-7"]));
    assert_eq!(profile["title"], json!("Scholar"));
    assert_eq!(
        store.calls()[0].1.changes[0].operation,
        UpdateOperation::Increment(25.into())
    );
}

#[tokio::test(start_paused = true)]
async fn a_failing_user_does_not_sink_the_others() {
    let store = Arc::new(InMemoryProfileStore::new());
    store.fail_user("B", StoreError::rejected("row locked"));
    let sync = UserDataSyncProcessor::new(store.clone(), BatchConfig::default().with_retry_attempts(0));

    sync.update_many([
        UserDataUpdate::set("A", "level", 2),
        UserDataUpdate::set("B", "level", 5),
        UserDataUpdate::increment("B", "xp", 10),
    ])
    .await;
    let summary = sync.flush().await;

    assert_eq!(summary.successful, 1);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.exhausted, 2);
    assert_eq!(store.profile("A").unwrap()["level"], json!(2));
    assert!(store.profile("B").is_none());

    let dead = sync.processor().take_dead_letters();
    assert_eq!(dead.len(), 2);
    assert!(dead.iter().all(|letter| letter.item.payload.user_id == "B"));
    assert!(dead[0].error.contains("row locked"));
}

#[tokio::test(start_paused = true)]
async fn progress_sync_is_a_single_patch() {
    let store = Arc::new(InMemoryProfileStore::new());
    let sync = UserDataSyncProcessor::with_defaults(store.clone());

    let ids = sync.sync_user_progress("u9", 1_250, 7).await;
    sync.flush().await;

    assert_eq!(ids.len(), 3);
    assert_eq!(store.calls().len(), 1);
    let profile = store.profile("u9").unwrap();
    assert_eq!(profile["xp"], json!(1_250));
    assert_eq!(profile["level"], json!(7));
    assert!(profile["last_updated"].is_string());
}
