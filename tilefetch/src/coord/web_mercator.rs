//! Web Mercator (EPSG:3857) tiling scheme.

use super::{Cartographic, Rectangle, TilingScheme, MAX_LEVEL};
use std::f64::consts::PI;

/// Maximum latitude representable in Web Mercator, in radians.
///
/// This is `atan(sinh(PI))`, roughly 85.0511 degrees: the latitude whose
/// projected Y equals the projected half-width of the world.
pub const MAX_LATITUDE: f64 = 1.484_422_229_745_332_4;

/// Projects a latitude (radians) to the Web Mercator Y axis, in units where
/// the world spans `[-PI, PI]`.
#[inline]
pub fn mercator_y(latitude: f64) -> f64 {
    latitude.tan().asinh()
}

/// The standard slippy-map tiling scheme: one tile at level 0, doubling in
/// each direction at every level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WebMercatorTilingScheme {
    rectangle: Rectangle,
}

impl WebMercatorTilingScheme {
    /// Create the scheme covering the whole Web Mercator world.
    pub fn new() -> Self {
        Self {
            rectangle: Rectangle::new(-PI, -MAX_LATITUDE, PI, MAX_LATITUDE),
        }
    }
}

impl Default for WebMercatorTilingScheme {
    fn default() -> Self {
        Self::new()
    }
}

impl TilingScheme for WebMercatorTilingScheme {
    fn rectangle(&self) -> Rectangle {
        self.rectangle
    }

    fn x_tiles_at_level(&self, level: u32) -> u32 {
        1u32 << level.min(MAX_LEVEL)
    }

    fn y_tiles_at_level(&self, level: u32) -> u32 {
        1u32 << level.min(MAX_LEVEL)
    }

    fn position_to_tile(&self, position: Cartographic, level: u32) -> Option<(u32, u32)> {
        if !self.rectangle.contains(&position) {
            return None;
        }

        let x_tiles = self.x_tiles_at_level(level);
        let y_tiles = self.y_tiles_at_level(level);

        let north = mercator_y(self.rectangle.north);
        let south = mercator_y(self.rectangle.south);

        let distance_from_west = position.longitude - self.rectangle.west;
        let distance_from_north = north - mercator_y(position.latitude);

        // Float-to-int casts saturate, so tiny negative distances land on 0.
        let column = (distance_from_west / self.rectangle.width() * f64::from(x_tiles)) as u32;
        let row = (distance_from_north / (north - south) * f64::from(y_tiles)) as u32;

        Some((column.min(x_tiles - 1), row.min(y_tiles - 1)))
    }
}
