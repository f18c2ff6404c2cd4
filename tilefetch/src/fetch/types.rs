//! Fetch request, error and executor types

use bytes::Bytes;
use std::future::Future;

use super::decode::DecodeError;

/// Errors that can end a single fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Transport failure (connection refused, reset, timeout, ...)
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// The server refused a cross-origin request
    #[error("Cross-origin request rejected: {0}")]
    CrossOrigin(String),

    /// Bytes arrived but are not a usable image
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The request was aborted by the scheduler or its owner
    #[error("Request cancelled")]
    Cancelled,
}

/// Coarse classification of a [`FetchError`] for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network, HTTP or cross-origin failure; retryable per policy.
    Transient,
    /// The payload could not be decoded.
    Decode,
    /// Aborted; never retried automatically.
    Cancellation,
}

impl FetchError {
    /// Classifies this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Network(_) | Self::Http { .. } | Self::CrossOrigin(_) => FailureKind::Transient,
            Self::Decode(_) => FailureKind::Decode,
            Self::Cancelled => FailureKind::Cancellation,
        }
    }

    /// Returns true if this is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// A single resource request handed to a [`FetchExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    url: String,
    cross_origin: bool,
}

impl FetchRequest {
    /// Creates a same-origin request for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cross_origin: false,
        }
    }

    /// Marks the request as needing cross-origin-safe image data.
    ///
    /// The flag is passed through to the executor untouched.
    pub fn with_cross_origin(mut self, cross_origin: bool) -> Self {
        self.cross_origin = cross_origin;
        self
    }

    /// The resource URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns true if cross-origin-safe loading was requested.
    pub fn is_cross_origin(&self) -> bool {
        self.cross_origin
    }
}

/// Performs exactly one fetch per call.
///
/// Implementations must not retry internally and must report ordinary
/// network failures as `Err` values rather than panicking.
pub trait FetchExecutor: Send + Sync + 'static {
    /// Fetches the raw bytes for `request`.
    fn fetch(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<Bytes, FetchError>> + Send;
}
