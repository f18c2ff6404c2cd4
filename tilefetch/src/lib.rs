//! tilefetch - Tiled imagery fetching with retries
//!
//! This library fetches raster map tiles addressed by `(level, row, column)`
//! from slippy-map style tile servers. It limits concurrent requests,
//! retries failed fetches under a caller-supplied policy, and shares each
//! tile's image between any number of consumers through reference-counted
//! handles.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────── TileLoader (event loop) ────────────────────────┐
//! │  TileHandle ──► TileRequestState ──► RequestScheduler ──► FetchExecutor │
//! │  (refcount)     (retry state)        (concurrency gate)   (one GET)     │
//! │                       │                                                 │
//! │                  RetryPolicy                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`coord`]: tile coordinates and the Web Mercator tiling scheme
//! - [`url`]: tile URL construction
//! - [`provider`]: imagery providers with construction-time validation
//! - [`fetch`]: the fetch executor, HTTP implementation and image decoding
//! - [`scheduler`]: the request scheduler
//! - [`retry`]: retry policies
//! - [`request`]: the per-tile request state machine
//! - [`handle`]: reference-counted tile handles
//! - [`loader`]: the event loop that drives all of the above
//! - [`config`]: configuration file support
//! - [`logging`]: tracing setup

pub mod config;
pub mod coord;
pub mod fetch;
pub mod handle;
pub mod loader;
pub mod logging;
pub mod provider;
pub mod request;
pub mod retry;
pub mod scheduler;
pub mod url;

pub use coord::TileCoord;
pub use loader::{LoaderConfig, TileLoader, TileRef};
