//! Imagery provider abstraction
//!
//! An [`ImageryProvider`] describes a tile source: how to address a tile
//! (`url_for`), which tiling scheme it uses, and which levels and region it
//! serves. Providers validate their configuration when constructed, so an
//! impossible level/rectangle combination fails immediately instead of at
//! fetch time.
//!
//! # Example
//!
//! ```ignore
//! use tilefetch::provider::{OpenStreetMapConfig, OpenStreetMapProvider};
//!
//! let provider = OpenStreetMapProvider::new(
//!     OpenStreetMapConfig::new().with_url("https://tile.example.com/"),
//! )?;
//! let url = provider.url_for(&TileCoord::new(3, 2, 5));
//! ```

mod osm;

pub use osm::{
    OpenStreetMapConfig, OpenStreetMapProvider, DEFAULT_CREDIT, DEFAULT_OSM_URL,
    DEFAULT_TILE_SIZE, MAX_TILES_AT_MINIMUM_LEVEL,
};

use crate::coord::{Rectangle, TileCoord, TilingScheme};

/// Configuration errors raised when a provider is constructed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The rectangle does not overlap the tiling scheme at all.
    #[error("Rectangle {rectangle:?} lies outside the tiling scheme")]
    RectangleOutsideScheme { rectangle: Rectangle },

    /// The minimum level is above the maximum level.
    #[error("Minimum level {minimum} is greater than maximum level {maximum}")]
    LevelRange { minimum: u32, maximum: u32 },

    /// A level beyond what the scheme can address.
    #[error("Level {level} exceeds the highest supported level {max}")]
    LevelTooHigh { level: u32, max: u32 },

    /// No tile of the rectangle exists at the minimum level.
    #[error("The rectangle covers no tiles at minimum level {level}")]
    NoTilesAtMinimumLevel { level: u32 },

    /// The rectangle needs too many tiles at the minimum level.
    #[error(
        "The rectangle covers {count} tiles at minimum level {level}; at most {max} are allowed"
    )]
    TooManyTilesAtMinimumLevel { count: u64, level: u32, max: u64 },
}

/// A source of tiled imagery.
pub trait ImageryProvider: Send + Sync {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// URL of the image for `coord`.
    fn url_for(&self, coord: &TileCoord) -> String;

    /// The tiling scheme used to number tiles.
    fn tiling_scheme(&self) -> &dyn TilingScheme;

    /// Region served by this provider.
    fn rectangle(&self) -> Rectangle;

    /// Lowest level served.
    fn minimum_level(&self) -> u32;

    /// Highest level served, if bounded.
    fn maximum_level(&self) -> Option<u32>;

    /// Tile width in pixels.
    fn tile_width(&self) -> u32;

    /// Tile height in pixels.
    fn tile_height(&self) -> u32;

    /// Attribution shown with the imagery.
    fn credit(&self) -> &str;

    /// Whether tiles carry a meaningful alpha channel.
    fn has_alpha_channel(&self) -> bool {
        true
    }

    /// Returns true if `coord` can be requested from this provider.
    fn is_valid_tile(&self, coord: &TileCoord) -> bool {
        coord.level() >= self.minimum_level()
            && self
                .maximum_level()
                .map_or(true, |maximum| coord.level() <= maximum)
            && self.tiling_scheme().contains_tile(coord)
    }
}
