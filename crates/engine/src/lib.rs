//! `batchline-engine`: the batch queue runtime.
//!
//! ## Components
//!
//! - `BatchQueue`: insertion-ordered pending items with atomic take-all
//! - `FlushScheduler`: the single debounced flush timer plus delayed retry re-appends
//! - `BatchHandler`: the injected processing function
//! - `BatchProcessor`: owns queue and scheduler, enforces at-most-one flush in flight
//!   and routes failures through exponential backoff

pub mod handler;
pub mod processor;
pub mod queue;
pub mod scheduler;
pub mod stats;

mod sync;

pub use batchline_core::{
    BatchConfig, BatchError, BatchItem, BatchResult, BatchSummary, DeadLetter, ItemId,
    ProcessResult,
};
pub use handler::{BatchHandler, FnHandler, handler_fn};
pub use processor::BatchProcessor;
pub use queue::BatchQueue;
pub use scheduler::FlushScheduler;
pub use stats::ProcessorStats;
