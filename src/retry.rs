//! Retry strategies and backoff logic.

use crate::RetrySettings;
use std::time::Duration;

/// Configuration for retry behavior
///
/// Internal type - users configure retries via `RetrySettings` in `DataConnectorConfig`.
#[derive(Debug, Clone)]
pub(crate) struct RetryConfig {
    /// Maximum number of retry attempts
    max_retries: u32,
    /// Base backoff duration in milliseconds
    base_backoff_ms: u64,
    /// Maximum backoff duration in milliseconds
    max_backoff_ms: u64,
    /// Backoff multiplier for exponential backoff
    multiplier: f64,
    /// Add jitter to backoff to avoid thundering herd
    jitter: bool,
}

impl RetryConfig {
    /// Create a new retry configuration
    pub(crate) fn new(max_retries: u32, base_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            base_backoff_ms,
            max_backoff_ms,
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// Create exponential backoff configuration
    pub(crate) fn exponential(max_retries: u32) -> Self {
        Self::new(max_retries, 1000, 30000)
    }

    /// Disable jitter
    #[cfg(test)]
    pub(crate) fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::exponential(3)
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_retries,
            settings.retry_backoff_ms,
            settings.max_backoff_ms,
        )
    }
}

/// Retry strategy implementation
///
/// Internal type - users configure retries via `RetrySettings` in `DataConnectorConfig`.
#[derive(Debug, Clone, Default)]
pub(crate) struct RetryStrategy {
    config: RetryConfig,
}

impl RetryStrategy {
    /// Create a new retry strategy
    pub(crate) fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Calculate the backoff duration for a given attempt
    ///
    /// # Arguments
    ///
    /// * `attempt` - The current attempt number (1-indexed)
    pub(crate) fn calculate_backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }

        let mut backoff_ms =
            self.config.base_backoff_ms as f64 * self.config.multiplier.powi((attempt - 1) as i32);

        // Cap at max backoff
        backoff_ms = backoff_ms.min(self.config.max_backoff_ms as f64);

        if self.config.jitter {
            use rand::Rng;
            let jitter_factor = rand::rng().random_range(0.5..1.5);
            backoff_ms *= jitter_factor;
            backoff_ms = backoff_ms.min(self.config.max_backoff_ms as f64);
        }

        Duration::from_millis(backoff_ms as u64)
    }

    /// Check if should retry based on attempt count
    pub(crate) fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.config.max_retries
    }
}
