//! Tile loader
//!
//! The [`TileLoader`] ties the pieces together. It hands out shared tile
//! handles, starts one [`TileRequestState`](crate::request::TileRequestState)
//! per loading tile, routes scheduler completions through the image decoder
//! and the retry policy, and tears handles down when their last reference
//! is released.
//!
//! ```text
//!  request_tile ──► TileHandle ──► TileRequestState ──submit──► RequestScheduler
//!       ▲               ▲                 ▲                          │
//!    release        mark_*           on_outcome ◄── decode ◄── Completion
//!                                         │
//!                                    RetryPolicy ──► failures (broadcast)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tilefetch::loader::{LoaderConfig, TileLoader};
//! use tilefetch::retry::BackoffPolicy;
//!
//! let mut loader = TileLoader::new(provider, executor, LoaderConfig::default())
//!     .with_retry_policy(BackoffPolicy::exponential(3));
//! let tile = loader.request_tile(TileCoord::new(3, 2, 5))?;
//! loader.run_until_idle().await;
//! let image = loader.image(&tile);
//! loader.release(tile)?;
//! ```

mod config;
mod core;

pub use config::{LoaderConfig, DEFAULT_FAILURE_CHANNEL_CAPACITY};
pub use core::{LoaderError, TileFailure, TileLoader, TileRef};
