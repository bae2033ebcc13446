//! Per-kind processor configuration.

use std::fmt;
use std::time::Duration;

use batchline_core::{BatchConfig, ConfigError};
use serde::{Deserialize, Serialize};

/// The processors a registry can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorKind {
    Questions,
    Analytics,
    UserSync,
}

impl ProcessorKind {
    pub const ALL: [ProcessorKind; 3] = [Self::Questions, Self::Analytics, Self::UserSync];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Questions => "questions",
            Self::Analytics => "analytics",
            Self::UserSync => "user_sync",
        }
    }

    /// Prefix of the environment keys read by [`RegistryConfig::from_env`].
    pub fn env_prefix(self) -> &'static str {
        match self {
            Self::Questions => "BATCHLINE_QUESTIONS",
            Self::Analytics => "BATCHLINE_ANALYTICS",
            Self::UserSync => "BATCHLINE_USER_SYNC",
        }
    }

    /// Size and interval tuned for the kind's traffic.
    pub fn default_config(self) -> BatchConfig {
        let (size, interval_ms) = match self {
            Self::Questions => (50, 2_000),
            Self::Analytics => (100, 10_000),
            Self::UserSync => (50, 3_000),
        };
        BatchConfig::default()
            .with_max_batch_size(size)
            .with_flush_interval(Duration::from_millis(interval_ms))
    }
}

impl fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration of every processor kind.
///
/// Missing sections take the kind's defaults. A section that is present
/// starts from the generic [`BatchConfig`] defaults for the fields it omits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub questions: BatchConfig,
    pub analytics: BatchConfig,
    pub user_sync: BatchConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            questions: ProcessorKind::Questions.default_config(),
            analytics: ProcessorKind::Analytics.default_config(),
            user_sync: ProcessorKind::UserSync.default_config(),
        }
    }
}

impl RegistryConfig {
    /// Defaults overlaid with `BATCHLINE_<KIND>_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlay every kind's section using its [`ProcessorKind::env_prefix`].
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for kind in ProcessorKind::ALL {
            let section = self.get(kind).clone();
            *self.get_mut(kind) = section.overlay(kind.env_prefix(), &lookup)?;
        }
        Ok(self)
    }

    pub fn get(&self, kind: ProcessorKind) -> &BatchConfig {
        match kind {
            ProcessorKind::Questions => &self.questions,
            ProcessorKind::Analytics => &self.analytics,
            ProcessorKind::UserSync => &self.user_sync,
        }
    }

    fn get_mut(&mut self, kind: ProcessorKind) -> &mut BatchConfig {
        match kind {
            ProcessorKind::Questions => &mut self.questions,
            ProcessorKind::Analytics => &mut self.analytics,
            ProcessorKind::UserSync => &mut self.user_sync,
        }
    }

    pub fn with(mut self, kind: ProcessorKind, config: BatchConfig) -> Self {
        *self.get_mut(kind) = config;
        self
    }
}
