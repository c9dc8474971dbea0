use image::imageops;
use image::{Rgba, RgbaImage};
use tilemosaic_types::cartesian::Size;

use crate::decoded_image::DecodedImage;

/// Area of the mosaic an output tile is sampled from, in mosaic pixels.
///
/// The area may extend past the mosaic, e.g. when the requested region reaches beyond the
/// layer bounds. Parts outside the mosaic stay transparent in the output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CropRect {
    pub(crate) x: f64,
    pub(crate) y: f64,
    pub(crate) width: f64,
    pub(crate) height: f64,
}

/// Tile placed into the mosaic with its top left corner at `(x, y)`.
pub(crate) struct PlacedTile<'a> {
    pub(crate) x: u32,
    pub(crate) y: u32,
    pub(crate) image: &'a DecodedImage,
}

/// Pixel buffer the raw tiles are assembled in.
///
/// The buffer is reused by all build jobs of a dispatcher. It grows to fit the largest mosaic
/// assembled so far and never shrinks.
pub(crate) struct ScratchCanvas {
    buffer: RgbaImage,
}

impl ScratchCanvas {
    pub(crate) fn new() -> Self {
        Self {
            buffer: RgbaImage::new(0, 0),
        }
    }

    pub(crate) fn capacity(&self) -> Size<u32> {
        Size::new(self.buffer.width(), self.buffer.height())
    }

    fn ensure_capacity(&mut self, size: Size<u32>) {
        let capacity = self.capacity();
        if size.width() <= capacity.width() && size.height() <= capacity.height() {
            return;
        }

        let width = size.width().max(capacity.width());
        let height = size.height().max(capacity.height());
        log::debug!("Growing scratch canvas to {width}x{height}");

        self.buffer = RgbaImage::new(width, height);
    }

    fn clear(&mut self, size: Size<u32>) {
        for y in 0..size.height() {
            for x in 0..size.width() {
                self.buffer.put_pixel(x, y, Rgba([0, 0, 0, 0]));
            }
        }
    }

    /// Assembles the mosaic of `mosaic_size` pixels from the tiles and samples the `crop` area
    /// of it into an image of `output_size` with nearest neighbour sampling.
    ///
    /// Parts of the mosaic not covered by any tile are transparent black. Tiles are clipped to
    /// `tile_size`.
    pub(crate) fn compose<'a>(
        &mut self,
        mosaic_size: Size<u32>,
        tile_size: Size<u32>,
        tiles: impl IntoIterator<Item = PlacedTile<'a>>,
        crop: CropRect,
        output_size: Size<u32>,
    ) -> Option<DecodedImage> {
        if mosaic_size.is_zero() || output_size.is_zero() {
            return None;
        }

        self.ensure_capacity(mosaic_size);
        self.clear(mosaic_size);

        for tile in tiles {
            let Some(view) = tile.image.as_rgba() else {
                log::warn!("Skipping tile with inconsistent pixel buffer");
                continue;
            };

            let width = view.width().min(tile_size.width());
            let height = view.height().min(tile_size.height());
            if width == view.width() && height == view.height() {
                imageops::replace(&mut self.buffer, &view, tile.x as i64, tile.y as i64);
            } else {
                let clipped = imageops::crop_imm(&view, 0, 0, width, height);
                imageops::replace(&mut self.buffer, &*clipped, tile.x as i64, tile.y as i64);
            }
        }

        // Degenerate crops still sample one mosaic pixel.
        let step_x = crop.width.max(1.0) / output_size.width() as f64;
        let step_y = crop.height.max(1.0) / output_size.height() as f64;
        let mosaic_width = mosaic_size.width() as f64;
        let mosaic_height = mosaic_size.height() as f64;

        let buffer = &self.buffer;
        let output = RgbaImage::from_fn(output_size.width(), output_size.height(), |u, v| {
            let x = crop.x + (u as f64 + 0.5) * step_x;
            let y = crop.y + (v as f64 + 0.5) * step_y;
            if (0.0..mosaic_width).contains(&x) && (0.0..mosaic_height).contains(&y) {
                *buffer.get_pixel(x as u32, y as u32)
            } else {
                Rgba([0, 0, 0, 0])
            }
        });

        Some(DecodedImage::from_rgba(output))
    }
}
