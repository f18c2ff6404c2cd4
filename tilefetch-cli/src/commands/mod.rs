//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! - [`url`] - Print the URL of a tile
//! - [`fetch`] - Fetch a single tile with retries and save it

pub mod common;
pub mod fetch;
pub mod url;
