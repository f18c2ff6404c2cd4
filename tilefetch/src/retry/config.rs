//! Retry configuration.

use std::time::Duration;

use super::policy::{
    BackoffPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_DELAY_SECS,
    MAX_RETRY_DELAY_SECS,
};

/// Default number of retries. Failures are final unless configured otherwise.
pub const DEFAULT_MAX_RETRIES: u32 = 0;

/// Settings for the exponential [`BackoffPolicy`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries per tile request
    max_retries: u32,
    /// Delay before the first retry (milliseconds)
    initial_delay_ms: u64,
    /// Upper bound on any delay (seconds)
    max_delay_secs: u64,
    /// Growth factor per failure
    multiplier: f64,
}

impl RetryConfig {
    /// Create a new retry configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the initial delay in milliseconds.
    pub fn with_initial_delay_ms(mut self, delay: u64) -> Self {
        self.initial_delay_ms = delay;
        self
    }

    /// Set the maximum delay in seconds.
    ///
    /// Values above [`MAX_RETRY_DELAY_SECS`] are lowered to it.
    pub fn with_max_delay_secs(mut self, delay: u64) -> Self {
        self.max_delay_secs = delay.min(MAX_RETRY_DELAY_SECS);
        self
    }

    /// Set the backoff multiplier.
    ///
    /// Non-finite values and values below 1.0 are replaced with 1.0.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier.is_finite() && multiplier >= 1.0 {
            multiplier
        } else {
            1.0
        };
        self
    }

    /// Get the maximum number of retries.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Get the initial delay in milliseconds.
    pub fn initial_delay_ms(&self) -> u64 {
        self.initial_delay_ms
    }

    /// Get the maximum delay in seconds.
    pub fn max_delay_secs(&self) -> u64 {
        self.max_delay_secs
    }

    /// Get the backoff multiplier.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Builds the policy described by this configuration.
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy::Exponential {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_secs(self.max_delay_secs),
            multiplier: self.multiplier,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            max_delay_secs: DEFAULT_MAX_DELAY_SECS,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_never_retries() {
        let policy = RetryConfig::default().policy();
        assert_eq!(policy.max_retries(), 0);
        assert_eq!(policy.delay_for_retry(0), None);
    }

    #[test]
    fn test_config_builder() {
        let config = RetryConfig::new()
            .with_max_retries(4)
            .with_initial_delay_ms(50)
            .with_max_delay_secs(2)
            .with_multiplier(3.0);

        let policy = config.policy();
        assert_eq!(policy.max_retries(), 4);
        assert_eq!(policy.delay_for_retry(0), Some(Duration::from_millis(50)));
        assert_eq!(policy.delay_for_retry(1), Some(Duration::from_millis(150)));
    }

    #[test]
    fn test_max_delay_is_capped() {
        let config = RetryConfig::new()
            .with_max_retries(60)
            .with_max_delay_secs(u64::MAX)
            .with_multiplier(1e300);
        assert_eq!(config.max_delay_secs(), MAX_RETRY_DELAY_SECS);

        let policy = config.policy();
        assert_eq!(
            policy.delay_for_retry(50),
            Some(Duration::from_secs(MAX_RETRY_DELAY_SECS))
        );
    }

    #[test]
    fn test_invalid_multiplier_is_clamped() {
        assert_eq!(RetryConfig::new().with_multiplier(f64::NAN).multiplier(), 1.0);
        assert_eq!(RetryConfig::new().with_multiplier(0.5).multiplier(), 1.0);
    }
}
