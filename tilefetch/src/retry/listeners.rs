//! Event-listener style retry control.

use std::fmt;
use std::sync::RwLock;
use std::time::Duration;

use super::policy::{RetryContext, RetryDecision, RetryPolicy};
use crate::coord::TileCoord;
use crate::fetch::FetchError;

/// A failure notification that listeners may mark for retry.
#[derive(Debug)]
pub struct TileErrorEvent<'a> {
    /// The tile whose fetch failed.
    pub coord: TileCoord,
    /// Failures observed before this one.
    pub times_retried: u32,
    /// Why the attempt failed.
    pub reason: &'a FetchError,
    /// Set to true to authorize another attempt.
    pub retry: bool,
    /// Optional delay before the next attempt.
    pub retry_after: Option<Duration>,
}

/// Identifies a registered listener for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn Fn(&mut TileErrorEvent<'_>) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(ListenerId, Listener)>,
}

/// A [`RetryPolicy`] built from error-event listeners.
///
/// On each failure every listener is called in registration order with the
/// same mutable event. If any listener leaves `retry` set, the attempt is
/// retried, after `retry_after` when one was given. With no listeners
/// registered every failure is final.
///
/// Cancellations are never shown to listeners.
///
/// # Example
///
/// ```
/// use tilefetch::retry::ErrorListeners;
///
/// let listeners = ErrorListeners::new();
/// listeners.add_listener(|event| {
///     if event.times_retried < 3 {
///         event.retry = true;
///     }
/// });
/// assert_eq!(listeners.len(), 1);
/// ```
#[derive(Default)]
pub struct ErrorListeners {
    registry: RwLock<Registry>,
}

impl ErrorListeners {
    /// Creates an empty listener set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&mut TileErrorEvent<'_>) + Send + Sync + 'static,
    {
        let mut registry = match self.registry.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let id = ListenerId(registry.next_id);
        registry.next_id += 1;
        registry.listeners.push((id, Box::new(listener)));
        id
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut registry = match self.registry.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = registry.listeners.len();
        registry.listeners.retain(|(listener_id, _)| *listener_id != id);
        registry.listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        match self.registry.read() {
            Ok(registry) => registry.listeners.len(),
            Err(poisoned) => poisoned.into_inner().listeners.len(),
        }
    }

    /// Returns true if no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RetryPolicy for ErrorListeners {
    fn decide(&self, ctx: &RetryContext<'_>) -> RetryDecision {
        if ctx.reason.is_cancelled() {
            return RetryDecision::GiveUp;
        }

        let mut event = TileErrorEvent {
            coord: ctx.coord,
            times_retried: ctx.times_retried,
            reason: ctx.reason,
            retry: false,
            retry_after: None,
        };

        let registry = match self.registry.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (_, listener) in registry.listeners.iter() {
            listener(&mut event);
        }

        match (event.retry, event.retry_after) {
            (false, _) => RetryDecision::GiveUp,
            (true, Some(delay)) if !delay.is_zero() => RetryDecision::RetryAfter(delay),
            (true, _) => RetryDecision::Retry,
        }
    }
}

impl fmt::Debug for ErrorListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorListeners")
            .field("listeners", &self.len())
            .finish()
    }
}
