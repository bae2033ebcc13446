//! Error model for batch processing.

use std::time::Duration;

use thiserror::Error;

use crate::result::BatchResult;

/// What a processing function returns for one call.
///
/// `Err` is a batch-level failure: every item of the call is treated as failed
/// with that error.
pub type ProcessResult<T> = Result<BatchResult<T>, BatchError>;

/// Failure attached to an item (or to a whole processing call).
///
/// Cloneable because a single flush result may be handed to several awaiting
/// callers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// The remote call (or storage operation) behind the processing function failed.
    #[error("remote call failed: {0}")]
    Remote(String),

    /// The processing function exceeded the configured deadline.
    #[error("processing timed out after {0:?}")]
    Timeout(Duration),

    /// The processing function panicked.
    #[error("processing function panicked: {0}")]
    Panicked(String),

    /// The processing function returned without mentioning this item.
    #[error("item was not reported by the processing function")]
    Unreported,

    /// The processing function marked the item failed without giving a reason.
    #[error("item failed without an error")]
    Unspecified,

    /// The processor was destroyed while the item waited for a retry.
    #[error("retry cancelled before it ran")]
    Cancelled,
}

impl BatchError {
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    pub fn panicked(msg: impl Into<String>) -> Self {
        Self::Panicked(msg.into())
    }
}

/// Configuration could not be parsed.
///
/// Only *parsing* is checked. Nonsensical but well-formed values (a batch size
/// of zero, a huge interval) are accepted and simply degrade.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}
