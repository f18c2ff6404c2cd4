//! Fetch executor abstraction
//!
//! This module provides the [`FetchExecutor`] trait, which performs exactly
//! one network fetch per call, along with the HTTP implementation and the
//! image decoding collaborator.
//!
//! Executors know nothing about retries: failures are returned as
//! [`FetchError`] values and the tile request state machine decides what
//! happens next.

mod decode;
mod http;
#[cfg(test)]
pub(crate) mod mock;
mod types;

pub use decode::{DecodeError, DecodeOptions, DecodedImage, ImageDecoder, RasterDecoder};
pub use http::{HttpConfig, HttpFetcher, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
pub use types::{FailureKind, FetchError, FetchExecutor, FetchRequest};

#[cfg(test)]
pub(crate) use decode::tests::png_bytes;
