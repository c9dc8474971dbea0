//! Raster images in RGBA8 layout: decoded raw tiles and composed output tiles.

use image::{ImageBuffer, Rgba, RgbaImage};
use tilemosaic_types::cartesian::Size;

use crate::error::MosaicError;

/// An image that has been loaded into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// Raw bytes of the image, in RGBA order.
    bytes: Vec<u8>,
    /// Width and height of the image.
    dimensions: Size<u32>,
}

impl DecodedImage {
    /// Decode an image from a byte slice.
    ///
    /// Attempts to guess the format of the image from the data. Non-RGBA images
    /// will be converted to RGBA.
    pub fn decode(bytes: &[u8]) -> Result<Self, MosaicError> {
        let decoded = image::load_from_memory(bytes)?.to_rgba8();
        Ok(Self::from_rgba(decoded))
    }

    /// Creates an image from raw RGBA bytes. Fails if the buffer length does not match the
    /// dimensions.
    pub fn from_raw(bytes: Vec<u8>, dimensions: Size<u32>) -> Result<Self, MosaicError> {
        let expected = dimensions.width() as usize * dimensions.height() as usize * 4;
        if bytes.len() != expected {
            return Err(MosaicError::Generic(format!(
                "image buffer of {} bytes does not match {}x{} RGBA image",
                bytes.len(),
                dimensions.width(),
                dimensions.height()
            )));
        }

        Ok(Self { bytes, dimensions })
    }

    pub(crate) fn from_rgba(image: RgbaImage) -> Self {
        let dimensions = Size::new(image.width(), image.height());
        Self {
            bytes: image.into_raw(),
            dimensions,
        }
    }

    /// Width of the image in pixels.
    pub fn width(&self) -> u32 {
        self.dimensions.width()
    }

    /// Height of the image in pixels.
    pub fn height(&self) -> u32 {
        self.dimensions.height()
    }

    /// Size of the image in pixels.
    pub fn size(&self) -> Size<u32> {
        self.dimensions
    }

    /// Raw RGBA bytes, row by row starting from the top left corner.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// RGBA value of the pixel, or `None` if the pixel is outside of the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width() || y >= self.height() {
            return None;
        }

        let offset = (y as usize * self.width() as usize + x as usize) * 4;
        let mut pixel = [0; 4];
        pixel.copy_from_slice(&self.bytes[offset..offset + 4]);
        Some(pixel)
    }

    /// Borrowed view usable with `image::imageops`.
    pub(crate) fn as_rgba(&self) -> Option<ImageBuffer<Rgba<u8>, &[u8]>> {
        ImageBuffer::from_raw(self.width(), self.height(), self.bytes.as_slice())
    }

    /// Converts the image into an `image` buffer, e.g. to encode it into a file.
    pub fn into_rgba_image(self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.dimensions.width(), self.dimensions.height(), self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::tests::{encode_png, solid_rgba};

    #[test]
    fn decodes_png_into_rgba() {
        let png = encode_png(&solid_rgba(4, 2, [10, 20, 30, 255]));
        let image = DecodedImage::decode(&png).unwrap();

        assert_eq!(image.size(), Size::new(4, 2));
        assert_eq!(image.bytes().len(), 4 * 2 * 4);
        assert_eq!(image.pixel(3, 1), Some([10, 20, 30, 255]));
        assert_eq!(image.pixel(4, 0), None);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert_matches!(
            DecodedImage::decode(b"definitely not an image"),
            Err(MosaicError::ImageDecode(_))
        );
    }

    #[test]
    fn raw_buffer_must_match_dimensions() {
        assert!(DecodedImage::from_raw(vec![0; 16], Size::new(2, 2)).is_ok());
        assert_matches!(
            DecodedImage::from_raw(vec![0; 15], Size::new(2, 2)),
            Err(MosaicError::Generic(_))
        );
    }
}
