//! Retry decision types and the built-in policies.

use std::time::Duration;

use crate::coord::TileCoord;
use crate::fetch::{FailureKind, FetchError};

/// Default initial delay for exponential backoff (100ms).
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 100;

/// Default maximum delay for exponential backoff (30 seconds).
pub const DEFAULT_MAX_DELAY_SECS: u64 = 30;

/// Default multiplier for exponential backoff.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Longest wait honoured before a retry (one day, in seconds).
///
/// Longer delays returned by a policy are shortened to this.
pub const MAX_RETRY_DELAY_SECS: u64 = 24 * 60 * 60;

/// [`MAX_RETRY_DELAY_SECS`] as a `Duration`.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(MAX_RETRY_DELAY_SECS);

/// Immutable failure context handed to a [`RetryPolicy`].
#[derive(Debug, Clone, Copy)]
pub struct RetryContext<'a> {
    /// The tile whose fetch failed.
    pub coord: TileCoord,
    /// Failures observed before the one being decided on.
    pub times_retried: u32,
    /// Why the attempt failed.
    pub reason: &'a FetchError,
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Stop and surface the failure.
    GiveUp,
    /// Resubmit immediately.
    Retry,
    /// Resubmit once the delay has elapsed.
    RetryAfter(Duration),
}

impl RetryDecision {
    /// Returns true for either retry variant.
    pub fn is_retry(&self) -> bool {
        !matches!(self, Self::GiveUp)
    }

    /// The delay before resubmission, if retrying.
    pub fn delay(&self) -> Option<Duration> {
        match self {
            Self::GiveUp => None,
            Self::Retry => Some(Duration::ZERO),
            Self::RetryAfter(delay) => Some(*delay),
        }
    }
}

/// Decision point consulted on every failed fetch.
///
/// Policies only return a decision; they never touch request state.
/// Given the same context a policy should return the same decision.
pub trait RetryPolicy: Send + Sync {
    /// Decides whether the failed attempt described by `ctx` is retried.
    fn decide(&self, ctx: &RetryContext<'_>) -> RetryDecision;
}

impl<F> RetryPolicy for F
where
    F: Fn(&RetryContext<'_>) -> RetryDecision + Send + Sync,
{
    fn decide(&self, ctx: &RetryContext<'_>) -> RetryDecision {
        self(ctx)
    }
}

/// Pins a closure's signature so it can be used as a [`RetryPolicy`].
///
/// ```
/// use tilefetch::retry::{retry_fn, RetryDecision};
///
/// let policy = retry_fn(|ctx| {
///     if ctx.times_retried < 3 {
///         RetryDecision::Retry
///     } else {
///         RetryDecision::GiveUp
///     }
/// });
/// # let _ = policy;
/// ```
pub fn retry_fn<F>(f: F) -> F
where
    F: Fn(&RetryContext<'_>) -> RetryDecision + Send + Sync,
{
    f
}

/// The default policy: every failure is final.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeverRetry;

impl RetryPolicy for NeverRetry {
    fn decide(&self, _ctx: &RetryContext<'_>) -> RetryDecision {
        RetryDecision::GiveUp
    }
}

/// Bounded retries with a fixed or exponentially growing delay.
///
/// Transient and decode failures are retried until `max_retries` is
/// reached. Cancellations are never retried.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffPolicy {
    /// Constant delay between attempts.
    Fixed {
        /// Maximum number of retries (not counting the first attempt).
        max_retries: u32,
        /// Delay before each retry.
        delay: Duration,
    },

    /// Delay multiplied after each failure, capped at `max_delay`.
    Exponential {
        /// Maximum number of retries (not counting the first attempt).
        max_retries: u32,
        /// Delay before the first retry.
        initial_delay: Duration,
        /// Upper bound on any single delay.
        max_delay: Duration,
        /// Growth factor per failure (typically 2.0).
        multiplier: f64,
    },
}

impl BackoffPolicy {
    /// Creates an exponential policy with default delays.
    ///
    /// Uses:
    /// - Initial delay: 100ms ([`DEFAULT_INITIAL_DELAY_MS`])
    /// - Max delay: 30 seconds ([`DEFAULT_MAX_DELAY_SECS`])
    /// - Multiplier: 2.0 ([`DEFAULT_BACKOFF_MULTIPLIER`])
    pub fn exponential(max_retries: u32) -> Self {
        Self::Exponential {
            max_retries,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    /// Creates a fixed-delay policy.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self::Fixed { max_retries, delay }
    }

    /// Maximum number of retries allowed.
    pub fn max_retries(&self) -> u32 {
        match self {
            Self::Fixed { max_retries, .. } | Self::Exponential { max_retries, .. } => *max_retries,
        }
    }

    /// Delay before the retry that follows `times_retried` earlier retries.
    ///
    /// Returns `None` once the retry budget is spent.
    pub fn delay_for_retry(&self, times_retried: u32) -> Option<Duration> {
        if times_retried >= self.max_retries() {
            return None;
        }

        match self {
            Self::Fixed { delay, .. } => Some(*delay),
            Self::Exponential {
                initial_delay,
                max_delay,
                multiplier,
                ..
            } => {
                // initial_delay * multiplier^times_retried, saturating at max_delay
                let exponent = times_retried.min(i32::MAX as u32) as i32;
                let delay_ms = initial_delay.as_millis() as f64 * multiplier.powi(exponent);
                let max_ms = max_delay.as_millis() as f64;
                if delay_ms.is_nan() || delay_ms >= max_ms {
                    return Some(*max_delay);
                }
                Some(Duration::from_millis(delay_ms.max(0.0) as u64))
            }
        }
    }
}

impl RetryPolicy for BackoffPolicy {
    fn decide(&self, ctx: &RetryContext<'_>) -> RetryDecision {
        if ctx.reason.kind() == FailureKind::Cancellation {
            return RetryDecision::GiveUp;
        }

        match self.delay_for_retry(ctx.times_retried) {
            Some(delay) if delay.is_zero() => RetryDecision::Retry,
            Some(delay) => RetryDecision::RetryAfter(delay),
            None => RetryDecision::GiveUp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(times_retried: u32, reason: &FetchError) -> RetryContext<'_> {
        RetryContext {
            coord: TileCoord::new(3, 2, 1),
            times_retried,
            reason,
        }
    }

    fn network() -> FetchError {
        FetchError::Network("connection reset".to_string())
    }

    #[test]
    fn test_never_retry() {
        let reason = network();
        assert_eq!(NeverRetry.decide(&ctx(0, &reason)), RetryDecision::GiveUp);
    }

    #[test]
    fn test_decision_helpers() {
        assert!(!RetryDecision::GiveUp.is_retry());
        assert_eq!(RetryDecision::Retry.delay(), Some(Duration::ZERO));
        assert_eq!(
            RetryDecision::RetryAfter(Duration::from_secs(1)).delay(),
            Some(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_closure_policy() {
        let policy = retry_fn(|ctx| {
            if ctx.times_retried < 2 {
                RetryDecision::Retry
            } else {
                RetryDecision::GiveUp
            }
        });
        let reason = network();
        assert_eq!(policy.decide(&ctx(0, &reason)), RetryDecision::Retry);
        assert_eq!(policy.decide(&ctx(1, &reason)), RetryDecision::Retry);
        assert_eq!(policy.decide(&ctx(2, &reason)), RetryDecision::GiveUp);
    }

    #[test]
    fn test_fixed_backoff() {
        let policy = BackoffPolicy::fixed(2, Duration::from_millis(100));
        let reason = network();
        assert_eq!(
            policy.decide(&ctx(0, &reason)),
            RetryDecision::RetryAfter(Duration::from_millis(100))
        );
        assert_eq!(
            policy.decide(&ctx(1, &reason)),
            RetryDecision::RetryAfter(Duration::from_millis(100))
        );
        assert_eq!(policy.decide(&ctx(2, &reason)), RetryDecision::GiveUp);
    }

    #[test]
    fn test_fixed_zero_delay_retries_immediately() {
        let policy = BackoffPolicy::fixed(1, Duration::ZERO);
        let reason = network();
        assert_eq!(policy.decide(&ctx(0, &reason)), RetryDecision::Retry);
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = BackoffPolicy::Exponential {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        };

        assert_eq!(policy.delay_for_retry(0), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for_retry(1), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_for_retry(2), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_for_retry(3), None);
    }

    #[test]
    fn test_exponential_respects_max_delay() {
        let policy = BackoffPolicy::Exponential {
            max_retries: u32::MAX,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        };

        assert_eq!(policy.delay_for_retry(4), Some(Duration::from_secs(5)));
        // Overflowing the float range must not panic
        assert_eq!(policy.delay_for_retry(5000), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_exponential_defaults() {
        let policy = BackoffPolicy::exponential(3);
        assert_eq!(policy.max_retries(), 3);
        assert_eq!(
            policy.delay_for_retry(0),
            Some(Duration::from_millis(DEFAULT_INITIAL_DELAY_MS))
        );
    }

    #[test]
    fn test_backoff_never_retries_cancellation() {
        let policy = BackoffPolicy::exponential(5);
        assert_eq!(
            policy.decide(&ctx(0, &FetchError::Cancelled)),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_backoff_retries_decode_failures() {
        let policy = BackoffPolicy::fixed(1, Duration::ZERO);
        let reason = FetchError::from(crate::fetch::DecodeError::new("truncated"));
        assert_eq!(policy.decide(&ctx(0, &reason)), RetryDecision::Retry);
    }
}
