//! Tile URL construction for slippy-map style servers.
//!
//! Builds URLs of the form `{base}/{level}/{column}/{row}[@2x].{ext}`,
//! the layout used by OpenStreetMap and most XYZ tile servers.

use crate::coord::TileCoord;

/// Default image file extension.
pub const DEFAULT_FILE_EXTENSION: &str = "png";

/// Density marker requesting the high-resolution variant of a tile.
pub const RETINA_SUFFIX: &str = "@2x";

/// Builds request URLs for tile coordinates.
///
/// The base may be given with or without a trailing `/`; the builder always
/// places exactly one separator between the base and the tile path.
///
/// # Example
///
/// ```
/// use tilefetch::coord::TileCoord;
/// use tilefetch::url::TileUrlBuilder;
///
/// let builder = TileUrlBuilder::new("made/up/osm/server/").with_retina(true);
/// assert_eq!(
///     builder.build(&TileCoord::new(0, 0, 0)),
///     "made/up/osm/server/0/0/0@2x.png"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileUrlBuilder {
    base: String,
    file_extension: String,
    retina: bool,
}

impl TileUrlBuilder {
    /// Creates a builder for the given base URL.
    pub fn new(base: impl Into<String>) -> Self {
        let mut base = base.into();
        while base.ends_with('/') {
            base.pop();
        }

        Self {
            base,
            file_extension: DEFAULT_FILE_EXTENSION.to_string(),
            retina: false,
        }
    }

    /// Sets the file extension (a leading `.` is ignored).
    pub fn with_file_extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        self.file_extension = extension.trim_start_matches('.').to_string();
        self
    }

    /// Requests high-density tiles by inserting [`RETINA_SUFFIX`] before the extension.
    pub fn with_retina(mut self, retina: bool) -> Self {
        self.retina = retina;
        self
    }

    /// The base URL without trailing separators.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The file extension without a leading `.`.
    pub fn file_extension(&self) -> &str {
        &self.file_extension
    }

    /// Returns true if retina tiles are requested.
    pub fn is_retina(&self) -> bool {
        self.retina
    }

    /// Builds the URL for a tile.
    pub fn build(&self, coord: &TileCoord) -> String {
        let suffix = if self.retina { RETINA_SUFFIX } else { "" };
        let path = format!(
            "{}/{}/{}{}.{}",
            coord.level(),
            coord.column(),
            coord.row(),
            suffix,
            self.file_extension
        );

        if self.base.is_empty() {
            path
        } else {
            format!("{}/{}", self.base, path)
        }
    }
}
