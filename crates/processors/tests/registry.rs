use std::sync::Arc;
use std::time::Duration;

use batchline_infra::{
    InMemoryAnalyticsSink, InMemoryProfileStore, InMemoryQuestionStore, Question, StoreError,
};
use batchline_processors::{
    LifecycleBus, ProcessorKind, ProcessorRegistry, RegistryConfig, Stores, UserDataUpdate, attach,
};
use serde_json::{Map, Value};

struct Fixture {
    questions: Arc<InMemoryQuestionStore>,
    analytics: Arc<InMemoryAnalyticsSink>,
    profiles: Arc<InMemoryProfileStore>,
    registry: Arc<ProcessorRegistry>,
}

fn fixture() -> Fixture {
    batchline_observability::init();

    let questions = Arc::new(InMemoryQuestionStore::with_questions([Question::new("q1")]));
    let analytics = Arc::new(InMemoryAnalyticsSink::new());
    let profiles = Arc::new(InMemoryProfileStore::new());
    let stores = Stores {
        questions: questions.clone(),
        analytics: analytics.clone(),
        profiles: profiles.clone(),
    };

    Fixture {
        questions,
        analytics,
        profiles,
        registry: Arc::new(ProcessorRegistry::new(stores, RegistryConfig::default())),
    }
}

#[tokio::test(start_paused = true)]
async fn processors_are_created_once_on_demand() {
    let fx = fixture();
    assert!(fx.registry.created().is_empty());

    let first = fx.registry.user_sync();
    let second = fx.registry.user_sync();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(fx.registry.created(), vec![ProcessorKind::UserSync]);
    assert_eq!(first.processor().config().max_batch_size, 50);
}

#[tokio::test(start_paused = true)]
async fn concurrent_first_use_yields_one_instance() {
    let fx = fixture();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = fx.registry.clone();
            tokio::spawn(async move { registry.analytics() })
        })
        .collect();

    let mut instances = Vec::new();
    for handle in handles {
        instances.push(handle.await.unwrap());
    }
    assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
}

#[tokio::test(start_paused = true)]
async fn flush_all_flushes_only_created_processors() {
    let fx = fixture();
    fx.registry.analytics().track("opened", Map::new()).await;
    fx.registry
        .user_sync()
        .update_many([
            UserDataUpdate::set("A", "level", 2),
            UserDataUpdate::increment("A", "xp", 10),
            UserDataUpdate::set("B", "level", 4),
        ])
        .await;

    let summaries = fx.registry.flush_all().await;

    let kinds: Vec<ProcessorKind> = summaries.iter().map(|(kind, _)| *kind).collect();
    assert_eq!(kinds, vec![ProcessorKind::Analytics, ProcessorKind::UserSync]);
    assert_eq!(summaries[0].1.successful, 1);
    assert_eq!(summaries[1].1.successful, 3);
    assert_eq!(fx.analytics.records().len(), 1);
    assert_eq!(fx.profiles.calls().len(), 2);
    assert_eq!(fx.questions.call_count(), 0);
    assert!(!fx.registry.created().contains(&ProcessorKind::Questions));
}

#[tokio::test(start_paused = true)]
async fn shutdown_flushes_then_destroys() {
    let fx = fixture();
    let questions = fx.registry.questions();
    questions.prefetch(["q1"]).await;

    let summaries = fx.registry.shutdown().await;

    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].0, ProcessorKind::Questions);
    assert_eq!(summaries[0].1.successful, 1);
    assert!(questions.cached("q1").is_some());
    assert_eq!(questions.processor().queue_size(), 0);
    assert_eq!(questions.processor().pending_retries(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_delivers_updates_waiting_for_a_retry() {
    let fx = fixture();
    fx.profiles.failures().fail_next(StoreError::unavailable("503"));
    let user_sync = fx.registry.user_sync();
    user_sync
        .update_user_data(UserDataUpdate::set("A", "xp", 10))
        .await;

    let first = fx.registry.flush_all().await;
    assert_eq!(first[0].1.failed, 1);
    assert_eq!(user_sync.processor().pending_retries(), 1);

    let summaries = fx.registry.shutdown().await;

    assert_eq!(summaries[0].1.successful, 1);
    assert_eq!(fx.profiles.profile("A").unwrap()["xp"], Value::from(10));
    assert_eq!(user_sync.processor().pending_retries(), 0);
    assert!(user_sync.processor().take_dead_letters().is_empty());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(fx.profiles.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_dead_letters_retries_that_fail_again() {
    let fx = fixture();
    fx.profiles.failures().fail_always(StoreError::unavailable("503"));
    let user_sync = fx.registry.user_sync();
    user_sync
        .update_user_data(UserDataUpdate::set("A", "xp", 10))
        .await;
    fx.registry.flush_all().await;
    assert_eq!(user_sync.processor().pending_retries(), 1);

    fx.registry.shutdown().await;

    let letters = user_sync.processor().take_dead_letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].item.retry_count, 2);
    assert_eq!(letters[0].error, "retry cancelled before it ran");
    assert_eq!(user_sync.processor().stats().items_dropped, 1);
    assert_eq!(user_sync.processor().pending_retries(), 0);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(fx.profiles.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn suspend_signal_flushes_before_the_timer() {
    let fx = fixture();
    let bus = LifecycleBus::new();
    let listener = attach(fx.registry.clone(), &bus);

    fx.registry
        .user_sync()
        .update_user_data(UserDataUpdate::set("A", "seen_intro", true))
        .await;
    assert_eq!(bus.suspend(), 1);

    let profiles = fx.profiles.clone();
    tokio::time::timeout(Duration::from_secs(1), async move {
        while profiles.calls().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("suspend should flush well before the 3s interval");

    listener.detach();
    listener.finished().await;
}

#[tokio::test(start_paused = true)]
async fn terminate_signal_shuts_the_registry_down() {
    let fx = fixture();
    let bus = LifecycleBus::new();
    let listener = attach(fx.registry.clone(), &bus);

    fx.registry.analytics().track("closing", Map::new()).await;
    bus.terminate();
    listener.finished().await;

    assert_eq!(fx.analytics.records().len(), 1);
    assert_eq!(bus.suspend(), 0);
}
