#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use batchline_engine::{BatchConfig, BatchHandler, BatchItem, BatchProcessor, BatchResult, ProcessResult};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// One observed processing call.
#[derive(Debug, Clone)]
pub struct Call {
    pub at: Instant,
    pub items: Vec<BatchItem<String>>,
}

impl Call {
    pub fn payloads(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.payload.as_str()).collect()
    }
}

/// Handler that reports every call on a channel, then answers with `behavior`.
pub struct Recorder<B> {
    behavior: B,
    tx: mpsc::UnboundedSender<Call>,
}

#[async_trait]
impl<B> BatchHandler<String> for Recorder<B>
where
    B: Fn(&[BatchItem<String>]) -> ProcessResult<String> + Send + Sync,
{
    async fn process(&self, items: &[BatchItem<String>]) -> ProcessResult<String> {
        let _ = self.tx.send(Call {
            at: Instant::now(),
            items: items.to_vec(),
        });
        (self.behavior)(items)
    }
}

pub fn recorder<B>(behavior: B) -> (Arc<dyn BatchHandler<String>>, mpsc::UnboundedReceiver<Call>)
where
    B: Fn(&[BatchItem<String>]) -> ProcessResult<String> + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(Recorder { behavior, tx }), rx)
}

pub fn succeed_all(items: &[BatchItem<String>]) -> ProcessResult<String> {
    Ok(BatchResult::all_successful(items.to_vec()))
}

pub fn fail_all(items: &[BatchItem<String>]) -> ProcessResult<String> {
    Ok(BatchResult::all_failed(
        items.to_vec(),
        batchline_engine::BatchError::remote("unavailable"),
    ))
}

pub fn config(max_batch_size: usize, flush_interval_ms: u64) -> BatchConfig {
    BatchConfig::default()
        .with_max_batch_size(max_batch_size)
        .with_flush_interval(Duration::from_millis(flush_interval_ms))
}

pub fn processor(
    config: BatchConfig,
    handler: Arc<dyn BatchHandler<String>>,
) -> BatchProcessor<String> {
    BatchProcessor::with_handler("test", config, handler)
}

pub fn s(v: &str) -> String {
    v.to_string()
}

/// Nothing more arrives within `window` of virtual time.
pub async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<Call>, window: Duration) {
    if let Ok(Some(call)) = tokio::time::timeout(window, rx.recv()).await {
        panic!("unexpected processing call: {:?}", call.payloads());
    }
}
