//! Batch configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tuning knobs for one batch processor.
///
/// Deserializes from partial input: missing fields keep their defaults.
/// Durations are expressed in milliseconds on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Reaching this many queued items on `add` forces an immediate flush.
    pub max_batch_size: usize,
    /// Delay after the last (re)arm before a timer-driven flush.
    #[serde(rename = "flush_interval_ms", with = "duration_ms")]
    pub flush_interval: Duration,
    /// Maximum re-enqueue attempts per item.
    pub retry_attempts: u32,
    /// Base retry delay; attempt `n` waits `retry_delay * 2^(n-1)`.
    #[serde(rename = "retry_delay_ms", with = "duration_ms")]
    pub retry_delay: Duration,
    /// Deadline for one processing call. `None` waits indefinitely.
    #[serde(rename = "process_timeout_ms", with = "option_duration_ms")]
    pub process_timeout: Option<Duration>,
    /// How many dropped items are remembered for inspection.
    pub dead_letter_capacity: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            flush_interval: Duration::from_secs(5),
            retry_attempts: 3,
            retry_delay: Duration::from_secs(1),
            process_timeout: None,
            dead_letter_capacity: 1000,
        }
    }
}

impl BatchConfig {
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_process_timeout(mut self, timeout: Duration) -> Self {
        self.process_timeout = Some(timeout);
        self
    }

    pub fn with_dead_letter_capacity(mut self, capacity: usize) -> Self {
        self.dead_letter_capacity = capacity;
        self
    }

    /// Whether an item that has already been retried `retry_count` times may be retried again.
    pub fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.retry_attempts
    }

    /// Backoff before re-enqueueing an item whose `retry_count` was just incremented.
    ///
    /// `retry_delay * 2^(retry_count-1)`, saturating. No jitter.
    pub fn retry_backoff(&self, retry_count: u32) -> Duration {
        let exp = retry_count.saturating_sub(1).min(31);
        self.retry_delay.saturating_mul(1u32 << exp)
    }

    /// Overlay values from the process environment onto `self`.
    ///
    /// See [`BatchConfig::overlay`] for the recognised keys.
    pub fn overlay_env(self, prefix: &str) -> Result<Self, ConfigError> {
        self.overlay(prefix, |key| std::env::var(key).ok())
    }

    /// Overlay values found through `lookup` onto `self`.
    ///
    /// Recognised keys (with `prefix` = `BATCHLINE_QUESTIONS` for example):
    /// `{prefix}_MAX_BATCH_SIZE`, `{prefix}_FLUSH_INTERVAL_MS`,
    /// `{prefix}_RETRY_ATTEMPTS`, `{prefix}_RETRY_DELAY_MS`,
    /// `{prefix}_PROCESS_TIMEOUT_MS` (`0` disables the timeout) and
    /// `{prefix}_DEAD_LETTER_CAPACITY`.
    pub fn overlay<F>(mut self, prefix: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| {
            let key = format!("{prefix}_{suffix}");
            lookup(&key).map(|value| (key, value))
        };

        if let Some((key, value)) = get("MAX_BATCH_SIZE") {
            self.max_batch_size = parse(&key, &value)?;
        }
        if let Some((key, value)) = get("FLUSH_INTERVAL_MS") {
            self.flush_interval = Duration::from_millis(parse(&key, &value)?);
        }
        if let Some((key, value)) = get("RETRY_ATTEMPTS") {
            self.retry_attempts = parse(&key, &value)?;
        }
        if let Some((key, value)) = get("RETRY_DELAY_MS") {
            self.retry_delay = Duration::from_millis(parse(&key, &value)?);
        }
        if let Some((key, value)) = get("PROCESS_TIMEOUT_MS") {
            let ms: u64 = parse(&key, &value)?;
            self.process_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some((key, value)) = get("DEAD_LETTER_CAPACITY") {
            self.dead_letter_capacity = parse(&key, &value)?;
        }

        Ok(self)
    }
}

fn parse<V>(key: &str, value: &str) -> Result<V, ConfigError>
where
    V: FromStr,
    V::Err: core::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: V::Err| ConfigError::invalid(key, value, e.to_string()))
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod option_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis().min(u64::MAX as u128) as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
