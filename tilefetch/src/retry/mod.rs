//! Retry policy hook
//!
//! Every failed fetch is routed through a [`RetryPolicy`] together with an
//! immutable [`RetryContext`] (tile, failures so far, reason). The policy
//! answers with a [`RetryDecision`]; the tile request state machine does the
//! rest, including waiting out any delay before resubmitting.
//!
//! Policies provided here:
//!
//! - [`NeverRetry`]: the default, every failure is final
//! - [`BackoffPolicy`]: bounded retries with fixed or exponential delay
//! - [`ErrorListeners`]: listeners that set `retry = true` on a mutable event
//! - any `Fn(&RetryContext) -> RetryDecision` closure (see [`retry_fn`])

mod config;
mod listeners;
mod policy;

pub use config::RetryConfig;
pub use listeners::{ErrorListeners, ListenerId, TileErrorEvent};
pub use policy::{
    retry_fn, BackoffPolicy, NeverRetry, RetryContext, RetryDecision, RetryPolicy,
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_DELAY_SECS, MAX_RETRY_DELAY,
    MAX_RETRY_DELAY_SECS,
};
