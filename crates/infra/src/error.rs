use thiserror::Error;

/// Store error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("rejected by store: {0}")]
    Rejected(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    pub(crate) fn poisoned() -> Self {
        Self::Storage("lock poisoned".to_string())
    }
}
