use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MosaicError;
use crate::lod::LevelSetConfig;

/// Retry schedule of fetches rejected because of backpressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds. Doubled for every next retry.
    pub base_delay_ms: u64,
    /// Upper bound of the delay between retries, in milliseconds.
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Delay before the retry following the given attempt (counted from 1).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(20);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 5_000,
        }
    }
}

/// Configuration of a [`Dispatcher`](super::Dispatcher).
///
/// Every field has a default, so a JSON document only needs to list the values to change:
///
/// ```json
/// { "max_concurrent_fetches": 8, "build_deadline_ms": 10000 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Maximum number of raw tile transfers running at the same time.
    pub max_concurrent_fetches: usize,
    /// Maximum number of fetches waiting for a transfer slot. Fetches beyond it are rejected
    /// and retried according to `retry`.
    pub max_queued_fetches: usize,
    /// Retry schedule of rejected fetches.
    pub retry: RetryPolicy,
    /// Time a build job waits for its raw tiles before composing from the ones that arrived.
    /// `None` waits forever.
    pub build_deadline_ms: Option<u64>,
    /// Largest width or height (pixels) of the mosaic a build job may assemble. Jobs that
    /// need a larger one fail.
    pub max_mosaic_dimension: u32,
    /// User agent of the HTTP transport.
    pub user_agent: String,
    /// Connection timeout of the HTTP transport, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Request timeout of the HTTP transport, in milliseconds.
    pub request_timeout_ms: u64,
    /// Angular size (degrees) of a tile on the first level of the requesting pyramid.
    pub first_level_delta: f64,
}

impl DispatcherConfig {
    /// Parses the configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, MosaicError> {
        serde_json::from_str(json).map_err(|err| MosaicError::InvalidConfig(err.to_string()))
    }

    pub(crate) fn validate(&self) -> Result<(), MosaicError> {
        if self.max_concurrent_fetches == 0 {
            return Err(MosaicError::InvalidConfig(
                "max_concurrent_fetches must be positive".into(),
            ));
        }

        if self.max_mosaic_dimension == 0 {
            return Err(MosaicError::InvalidConfig(
                "max_mosaic_dimension must be positive".into(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(MosaicError::InvalidConfig(
                "retry.max_attempts must be positive".into(),
            ));
        }

        self.level_set()?;
        Ok(())
    }

    pub(crate) fn level_set(&self) -> Result<LevelSetConfig, MosaicError> {
        LevelSetConfig::new(self.first_level_delta).ok_or_else(|| {
            MosaicError::InvalidConfig(format!(
                "invalid first level delta {}",
                self.first_level_delta
            ))
        })
    }

    pub(crate) fn build_deadline(&self) -> Option<Duration> {
        self.build_deadline_ms.map(Duration::from_millis)
    }

    pub(crate) fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 4,
            max_queued_fetches: 64,
            retry: RetryPolicy::default(),
            build_deadline_ms: Some(30_000),
            max_mosaic_dimension: 16_384,
            user_agent: concat!("tilemosaic/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout_ms: 3_000,
            request_timeout_ms: 30_000,
            first_level_delta: 90.0,
        }
    }
}
