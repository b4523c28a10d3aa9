//! Retry policy with exponential backoff for transient cluster errors.

use crate::error::ClusterError;
use crate::types::Action;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry configuration for cluster calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_retries: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            base_delay,
            backoff_factor,
            ..Default::default()
        }
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Total number of attempts allowed for one action
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (0-indexed: 0 is the first retry).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}

/// Callback trait for retry notifications.
pub trait RetryCallback: Send + Sync {
    /// Called before waiting for the next attempt.
    ///
    /// # Arguments
    /// * `action` - The action being retried
    /// * `attempt` - Attempt that just failed (1-indexed)
    /// * `max_attempts` - Maximum number of attempts
    /// * `error` - The error that triggered the retry
    /// * `delay` - Wait before the next attempt
    fn on_retry(
        &self,
        action: &Action,
        attempt: u32,
        max_attempts: u32,
        error: &ClusterError,
        delay: Duration,
    );
}

/// No-op callback that does nothing.
pub struct NoCallback;

impl RetryCallback for NoCallback {
    fn on_retry(&self, _: &Action, _: u32, _: u32, _: &ClusterError, _: Duration) {}
}

/// Callback that logs each retry at warn level.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(
        &self,
        action: &Action,
        attempt: u32,
        max_attempts: u32,
        error: &ClusterError,
        delay: Duration,
    ) {
        log::warn!(
            "{action}: attempt {attempt}/{max_attempts} failed: {error}. Retrying in {:.1}s",
            delay.as_secs_f64()
        );
    }
}
