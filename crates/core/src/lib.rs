//! `batchline-core`: batching building blocks.
//!
//! This crate contains the **pure data** side of the batch queue (no async, no
//! timers): item identity, configuration, processing results and errors.

pub mod config;
pub mod error;
pub mod id;
pub mod item;
pub mod result;

pub use config::BatchConfig;
pub use error::{BatchError, ConfigError, ProcessResult};
pub use id::ItemId;
pub use item::{BatchItem, DeadLetter};
pub use result::{BatchResult, BatchSummary};
