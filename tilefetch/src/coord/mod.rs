//! Tile coordinate types and tiling-scheme math.
//!
//! Provides the `(level, row, column)` address of a tile, geographic
//! rectangles in radians, and the [`TilingScheme`] interface used to map
//! geographic positions to tile indices.
//!
//! # Coordinate System
//!
//! Tiles follow the usual slippy-map layout:
//! - Column increases eastward (0 to 2^level - 1)
//! - Row increases southward (0 to 2^level - 1)
//! - Level 0 is a single tile covering the whole scheme rectangle

mod web_mercator;

pub use web_mercator::{mercator_y, WebMercatorTilingScheme, MAX_LATITUDE};

use std::f64::consts::PI;
use std::fmt;

/// Highest tile level accepted by the tiling schemes.
pub const MAX_LEVEL: u32 = 30;

/// Address of a single tile in a tiling scheme.
///
/// # Example
///
/// ```
/// use tilefetch::coord::TileCoord;
///
/// let coord = TileCoord::new(3, 2, 5);
/// assert_eq!(coord.level(), 3);
/// assert_eq!(coord.row(), 2);
/// assert_eq!(coord.column(), 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    level: u32,
    row: u32,
    column: u32,
}

impl TileCoord {
    /// Create a new tile coordinate.
    pub fn new(level: u32, row: u32, column: u32) -> Self {
        Self { level, row, column }
    }

    /// Get the tile level.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Get the tile row (Y, increasing southward).
    pub fn row(&self) -> u32 {
        self.row
    }

    /// Get the tile column (X, increasing eastward).
    pub fn column(&self) -> u32 {
        self.column
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}/R{}/C{}", self.level, self.row, self.column)
    }
}

/// A geographic position in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cartographic {
    /// Longitude in radians.
    pub longitude: f64,
    /// Latitude in radians.
    pub latitude: f64,
}

impl Cartographic {
    /// Create a position from radians.
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Create a position from degrees.
    pub fn from_degrees(longitude: f64, latitude: f64) -> Self {
        Self::new(longitude.to_radians(), latitude.to_radians())
    }
}

/// A geographic rectangle in radians.
///
/// Rectangles crossing the antimeridian are not supported; `west` must not
/// exceed `east`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle {
    /// Westernmost longitude in radians.
    pub west: f64,
    /// Southernmost latitude in radians.
    pub south: f64,
    /// Easternmost longitude in radians.
    pub east: f64,
    /// Northernmost latitude in radians.
    pub north: f64,
}

impl Rectangle {
    /// Create a rectangle from radians.
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Create a rectangle from degrees.
    pub fn from_degrees(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self::new(
            west.to_radians(),
            south.to_radians(),
            east.to_radians(),
            north.to_radians(),
        )
    }

    /// The whole globe.
    pub fn max_value() -> Self {
        Self::new(-PI, -PI / 2.0, PI, PI / 2.0)
    }

    /// Width in radians.
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// Height in radians.
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Southwest corner.
    pub fn southwest(&self) -> Cartographic {
        Cartographic::new(self.west, self.south)
    }

    /// Northeast corner.
    pub fn northeast(&self) -> Cartographic {
        Cartographic::new(self.east, self.north)
    }

    /// Returns true if the position lies inside or on the edge of the rectangle.
    pub fn contains(&self, position: &Cartographic) -> bool {
        (self.west..=self.east).contains(&position.longitude)
            && (self.south..=self.north).contains(&position.latitude)
    }

    /// Computes the overlap of two rectangles.
    ///
    /// Returns `None` if they do not overlap.
    pub fn intersection(&self, other: &Rectangle) -> Option<Rectangle> {
        let west = self.west.max(other.west);
        let east = self.east.min(other.east);
        let south = self.south.max(other.south);
        let north = self.north.min(other.north);

        if west >= east || south >= north {
            return None;
        }

        Some(Rectangle::new(west, south, east, north))
    }
}

/// Maps geographic positions to tile indices.
///
/// This is the narrow interface the provider uses to validate its level
/// configuration and to bound-check tile coordinates.
pub trait TilingScheme: Send + Sync {
    /// Returns the rectangle covered by the scheme.
    fn rectangle(&self) -> Rectangle;

    /// Number of tile columns at the given level.
    fn x_tiles_at_level(&self, level: u32) -> u32;

    /// Number of tile rows at the given level.
    fn y_tiles_at_level(&self, level: u32) -> u32;

    /// Returns `(column, row)` of the tile containing `position`, or `None`
    /// if the position is outside the scheme rectangle.
    fn position_to_tile(&self, position: Cartographic, level: u32) -> Option<(u32, u32)>;

    /// Returns true if the coordinate addresses a tile of this scheme.
    fn contains_tile(&self, coord: &TileCoord) -> bool {
        coord.level() <= MAX_LEVEL
            && coord.column() < self.x_tiles_at_level(coord.level())
            && coord.row() < self.y_tiles_at_level(coord.level())
    }

    /// Counts the tiles touched by `rectangle` at `level`.
    ///
    /// Returns 0 when either corner falls outside the scheme.
    fn tile_count_in_rectangle(&self, rectangle: &Rectangle, level: u32) -> u64 {
        let southwest = self.position_to_tile(rectangle.southwest(), level);
        let northeast = self.position_to_tile(rectangle.northeast(), level);

        match (southwest, northeast) {
            (Some((sw_x, sw_y)), Some((ne_x, ne_y))) => {
                let columns = u64::from(sw_x.abs_diff(ne_x)) + 1;
                let rows = u64::from(sw_y.abs_diff(ne_y)) + 1;
                columns * rows
            }
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_coord_accessors() {
        let coord = TileCoord::new(18, 100000, 125184);
        assert_eq!(coord.level(), 18);
        assert_eq!(coord.row(), 100000);
        assert_eq!(coord.column(), 125184);
    }

    #[test]
    fn test_tile_coord_display() {
        assert_eq!(TileCoord::new(2, 1, 3).to_string(), "L2/R1/C3");
    }

    #[test]
    fn test_tile_coord_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(TileCoord::new(1, 0, 0));
        set.insert(TileCoord::new(1, 0, 0));
        set.insert(TileCoord::new(1, 0, 1));

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_rectangle_from_degrees() {
        let rect = Rectangle::from_degrees(0.0, 0.0, 1.0, 1.0);
        assert!((rect.east - 1.0_f64.to_radians()).abs() < 1e-12);
        assert!((rect.width() - rect.height()).abs() < 1e-12);
    }

    #[test]
    fn test_rectangle_contains_edges() {
        let rect = Rectangle::from_degrees(-10.0, -10.0, 10.0, 10.0);
        assert!(rect.contains(&rect.southwest()));
        assert!(rect.contains(&rect.northeast()));
        assert!(!rect.contains(&Cartographic::from_degrees(11.0, 0.0)));
    }

    #[test]
    fn test_rectangle_intersection() {
        let a = Rectangle::from_degrees(0.0, 0.0, 10.0, 10.0);
        let b = Rectangle::from_degrees(5.0, 5.0, 20.0, 20.0);

        let overlap = a.intersection(&b).unwrap();
        assert_eq!(overlap, Rectangle::from_degrees(5.0, 5.0, 10.0, 10.0));
    }

    #[test]
    fn test_rectangle_disjoint_intersection() {
        let a = Rectangle::from_degrees(0.0, 0.0, 1.0, 1.0);
        let b = Rectangle::from_degrees(2.0, 2.0, 3.0, 3.0);
        assert!(a.intersection(&b).is_none());
    }
}
