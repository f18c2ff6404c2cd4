//! OpenStreetMap-style tile provider.
//!
//! Serves tiles from any server using the slippy-map layout
//! `{base}/{z}/{x}/{y}.{ext}` in the Web Mercator tiling scheme.
//!
//! # URL Pattern
//!
//! `https://tile.openstreetmap.org/{z}/{x}/{y}.png`
//!
//! - X: Column (0 to 2^zoom - 1, west to east)
//! - Y: Row (0 to 2^zoom - 1, north to south)
//! - Z: Zoom level
//!
//! With retina tiles enabled the density marker goes before the extension:
//! `{z}/{x}/{y}@2x.png`.
//!
//! # Usage Policy
//!
//! The public OpenStreetMap servers are volunteer-run and require an
//! identifying User-Agent. See <https://operations.osmfoundation.org/policies/tiles/>

use tracing::debug;

use super::{ConfigError, ImageryProvider};
use crate::coord::{Rectangle, TileCoord, TilingScheme, WebMercatorTilingScheme, MAX_LEVEL};
use crate::url::{TileUrlBuilder, DEFAULT_FILE_EXTENSION};

/// Default OpenStreetMap tile server.
pub const DEFAULT_OSM_URL: &str = "https://tile.openstreetmap.org/";

/// Default attribution.
pub const DEFAULT_CREDIT: &str = "© OpenStreetMap contributors";

/// Tile width and height in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Largest number of tiles the rectangle may cover at the minimum level.
pub const MAX_TILES_AT_MINIMUM_LEVEL: u64 = 4;

/// Configuration for [`OpenStreetMapProvider`].
#[derive(Debug, Clone, PartialEq)]
pub struct OpenStreetMapConfig {
    /// Base URL of the tile server
    url: String,
    /// Image file extension (without the dot)
    file_extension: String,
    /// Request high-density tiles
    retina: bool,
    /// Region to serve; the whole scheme when unset
    rectangle: Option<Rectangle>,
    /// Lowest level served
    minimum_level: u32,
    /// Highest level served
    maximum_level: Option<u32>,
    /// Attribution text
    credit: String,
}

impl OpenStreetMapConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tile server base URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the image file extension.
    pub fn with_file_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = extension.into();
        self
    }

    /// Request high-density (`@2x`) tiles.
    pub fn with_retina(mut self, retina: bool) -> Self {
        self.retina = retina;
        self
    }

    /// Restrict the served region.
    pub fn with_rectangle(mut self, rectangle: Rectangle) -> Self {
        self.rectangle = Some(rectangle);
        self
    }

    /// Set the lowest level served.
    pub fn with_minimum_level(mut self, level: u32) -> Self {
        self.minimum_level = level;
        self
    }

    /// Set the highest level served.
    pub fn with_maximum_level(mut self, level: Option<u32>) -> Self {
        self.maximum_level = level;
        self
    }

    /// Set the attribution text.
    pub fn with_credit(mut self, credit: impl Into<String>) -> Self {
        self.credit = credit.into();
        self
    }

    /// Get the base URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get the file extension.
    pub fn file_extension(&self) -> &str {
        &self.file_extension
    }

    /// Get whether retina tiles are requested.
    pub fn retina(&self) -> bool {
        self.retina
    }

    /// Get the configured rectangle, if any.
    pub fn rectangle(&self) -> Option<Rectangle> {
        self.rectangle
    }

    /// Get the minimum level.
    pub fn minimum_level(&self) -> u32 {
        self.minimum_level
    }

    /// Get the maximum level.
    pub fn maximum_level(&self) -> Option<u32> {
        self.maximum_level
    }

    /// Get the attribution text.
    pub fn credit(&self) -> &str {
        &self.credit
    }
}

impl Default for OpenStreetMapConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_OSM_URL.to_string(),
            file_extension: DEFAULT_FILE_EXTENSION.to_string(),
            retina: false,
            rectangle: None,
            minimum_level: 0,
            maximum_level: None,
            credit: DEFAULT_CREDIT.to_string(),
        }
    }
}

/// Provider for OpenStreetMap and compatible tile servers.
///
/// A configured rectangle only restricts the served region; tile numbering
/// always follows the full Web Mercator scheme.
#[derive(Debug, Clone)]
pub struct OpenStreetMapProvider {
    urls: TileUrlBuilder,
    scheme: WebMercatorTilingScheme,
    rectangle: Rectangle,
    minimum_level: u32,
    maximum_level: Option<u32>,
    credit: String,
}

impl OpenStreetMapProvider {
    /// Creates a provider, validating the level and rectangle settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the levels are out of order or too high,
    /// if the rectangle misses the scheme, or if the rectangle covers zero
    /// or more than [`MAX_TILES_AT_MINIMUM_LEVEL`] tiles at the minimum
    /// level.
    pub fn new(config: OpenStreetMapConfig) -> Result<Self, ConfigError> {
        let scheme = WebMercatorTilingScheme::new();

        if config.minimum_level > MAX_LEVEL {
            return Err(ConfigError::LevelTooHigh {
                level: config.minimum_level,
                max: MAX_LEVEL,
            });
        }
        if let Some(maximum) = config.maximum_level {
            if maximum > MAX_LEVEL {
                return Err(ConfigError::LevelTooHigh {
                    level: maximum,
                    max: MAX_LEVEL,
                });
            }
            if config.minimum_level > maximum {
                return Err(ConfigError::LevelRange {
                    minimum: config.minimum_level,
                    maximum,
                });
            }
        }

        let requested = config.rectangle.unwrap_or_else(|| scheme.rectangle());
        let rectangle = requested
            .intersection(&scheme.rectangle())
            .ok_or(ConfigError::RectangleOutsideScheme {
                rectangle: requested,
            })?;

        let count = scheme.tile_count_in_rectangle(&rectangle, config.minimum_level);
        if count == 0 {
            return Err(ConfigError::NoTilesAtMinimumLevel {
                level: config.minimum_level,
            });
        }
        if count > MAX_TILES_AT_MINIMUM_LEVEL {
            return Err(ConfigError::TooManyTilesAtMinimumLevel {
                count,
                level: config.minimum_level,
                max: MAX_TILES_AT_MINIMUM_LEVEL,
            });
        }

        let urls = TileUrlBuilder::new(config.url)
            .with_file_extension(config.file_extension)
            .with_retina(config.retina);

        debug!(
            url = urls.base(),
            minimum_level = config.minimum_level,
            maximum_level = ?config.maximum_level,
            tiles_at_minimum = count,
            "OpenStreetMap provider created"
        );

        Ok(Self {
            urls,
            scheme,
            rectangle,
            minimum_level: config.minimum_level,
            maximum_level: config.maximum_level,
            credit: config.credit,
        })
    }

    /// The URL builder used for requests.
    pub fn url_builder(&self) -> &TileUrlBuilder {
        &self.urls
    }
}

impl ImageryProvider for OpenStreetMapProvider {
    fn name(&self) -> &str {
        "OpenStreetMap"
    }

    fn url_for(&self, coord: &TileCoord) -> String {
        self.urls.build(coord)
    }

    fn tiling_scheme(&self) -> &dyn TilingScheme {
        &self.scheme
    }

    fn rectangle(&self) -> Rectangle {
        self.rectangle
    }

    fn minimum_level(&self) -> u32 {
        self.minimum_level
    }

    fn maximum_level(&self) -> Option<u32> {
        self.maximum_level
    }

    fn tile_width(&self) -> u32 {
        DEFAULT_TILE_SIZE
    }

    fn tile_height(&self) -> u32 {
        DEFAULT_TILE_SIZE
    }

    fn credit(&self) -> &str {
        &self.credit
    }
}
