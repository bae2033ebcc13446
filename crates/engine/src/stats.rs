//! Processor runtime statistics.

use serde::Serialize;

/// Counters for one processor since construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessorStats {
    /// Processing calls made (empty flushes are not counted).
    pub flushes: u64,
    pub items_processed: u64,
    pub items_succeeded: u64,
    pub items_failed: u64,
    /// Failed items scheduled for another attempt.
    pub items_retried: u64,
    /// Items dropped after exhausting their retries or by `destroy`.
    pub items_dropped: u64,
    /// Processing calls that failed as a whole (error, panic or timeout).
    pub batch_failures: u64,
}
