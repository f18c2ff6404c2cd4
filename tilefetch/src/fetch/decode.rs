//! Image decoding collaborator.

use image::RgbaImage;
use std::fmt;
use std::sync::Arc;

/// The fetched bytes could not be turned into an image.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed to decode image: {0}")]
pub struct DecodeError(String);

impl DecodeError {
    /// Creates a decode error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Options passed through to the decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Flip rows so the first row is the bottom of the image (texture upload order).
    pub flip_y: bool,
}

/// A decoded RGBA8 image, cheap to clone.
#[derive(Clone)]
pub struct DecodedImage {
    pixels: Arc<RgbaImage>,
}

impl DecodedImage {
    /// Wraps decoded pixels.
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// The pixel buffer.
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Turns fetched bytes into an image.
pub trait ImageDecoder: Send + Sync {
    /// Decodes `bytes` according to `options`.
    fn decode(&self, bytes: &[u8], options: &DecodeOptions) -> Result<DecodedImage, DecodeError>;
}

/// Decoder backed by the `image` crate (PNG, JPEG, WebP, ...).
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterDecoder;

impl ImageDecoder for RasterDecoder {
    fn decode(&self, bytes: &[u8], options: &DecodeOptions) -> Result<DecodedImage, DecodeError> {
        let decoded =
            image::load_from_memory(bytes).map_err(|e| DecodeError::new(e.to_string()))?;

        let mut pixels = decoded.to_rgba8();
        if options.flip_y {
            image::imageops::flip_vertical_in_place(&mut pixels);
        }

        Ok(DecodedImage::new(pixels))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bytes::Bytes;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;

    /// Encodes a 16×16 PNG whose top half is red and bottom half is blue.
    pub(crate) fn png_bytes() -> Bytes {
        let img = RgbaImage::from_fn(16, 16, |_, y| {
            if y < 8 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        });
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png).unwrap();
        Bytes::from(buffer.into_inner())
    }

    #[test]
    fn test_decode_png() {
        let image = RasterDecoder
            .decode(&png_bytes(), &DecodeOptions::default())
            .unwrap();
        assert_eq!(image.width(), 16);
        assert_eq!(image.height(), 16);
        assert_eq!(image.pixels().get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_decode_flip_y() {
        let options = DecodeOptions { flip_y: true };
        let image = RasterDecoder.decode(&png_bytes(), &options).unwrap();
        assert_eq!(image.pixels().get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_decode_garbage() {
        let result = RasterDecoder.decode(b"definitely not an image", &DecodeOptions::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_empty() {
        assert!(RasterDecoder
            .decode(&[], &DecodeOptions::default())
            .is_err());
    }

    #[test]
    fn test_decoded_image_debug() {
        let image = RasterDecoder
            .decode(&png_bytes(), &DecodeOptions::default())
            .unwrap();
        let debug = format!("{:?}", image);
        assert!(debug.contains("width: 16"));
    }
}
