use std::sync::Arc;

use tilemosaic_types::cartesian::Size;
use tilemosaic_types::geo::GeoRegion;

use crate::compositor::{Dispatcher, TileRequest};
use crate::tile::ImageTile;
use crate::tile_matrix::TileMatrixSet;
use crate::wmts::{UrlTemplate, WmtsLayer};

/// Creates the tiles of a level pyramid for one WMTS layer.
///
/// Every created tile is submitted to the dispatcher right away and filled when its
/// composition is done.
#[derive(Debug, Clone)]
pub struct CompositeTileFactory {
    dispatcher: Dispatcher,
    layer: Arc<WmtsLayer>,
    matrix_set: Arc<TileMatrixSet>,
    url_template: UrlTemplate,
    tile_size: Size<u32>,
}

impl CompositeTileFactory {
    /// Creates a factory producing 256x256 pixel tiles.
    pub fn new(
        dispatcher: Dispatcher,
        layer: Arc<WmtsLayer>,
        matrix_set: Arc<TileMatrixSet>,
        url_template: UrlTemplate,
    ) -> Self {
        Self {
            dispatcher,
            layer,
            matrix_set,
            url_template,
            tile_size: Size::new(256, 256),
        }
    }

    /// Sets the size of the produced tiles.
    pub fn with_tile_size(mut self, tile_size: Size<u32>) -> Self {
        self.tile_size = tile_size;
        self
    }

    /// Size of the produced tiles.
    pub fn tile_size(&self) -> Size<u32> {
        self.tile_size
    }

    /// Creates a tile and requests its composition.
    pub fn create_tile(&self, region: GeoRegion, level: u32, row: u32, column: u32) -> Arc<ImageTile> {
        let request = TileRequest {
            region,
            level,
            layer: self.layer.clone(),
            matrix_set: self.matrix_set.clone(),
            url_template: self.url_template.clone(),
            desired_size: self.tile_size,
        };

        self.dispatcher.request_tile(request, row, column)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::compositor::DispatcherBuilder;
    use crate::tests::{crs84_quad, encode_png, solid_rgba, MemorySource, TEMPLATE};
    use crate::tile::TileContent;

    #[tokio::test]
    async fn creates_and_fills_tiles() {
        let source = MemorySource::new();
        let png = encode_png(&solid_rgba(256, 256, [200, 100, 0, 255]));
        for column in 0..4 {
            source.insert(&format!("https://tiles.test/world/1/1/{column}.png"), png.clone());
        }

        let dispatcher = DispatcherBuilder::new_with_source(source).build().unwrap();
        let factory = CompositeTileFactory::new(
            dispatcher,
            Arc::new(WmtsLayer::new("world", None)),
            Arc::new(crs84_quad(3)),
            UrlTemplate::new(TEMPLATE),
        )
        .with_tile_size(Size::new(64, 64));

        let region = GeoRegion::new(-90.0, 0.0, -180.0, 0.0).unwrap();
        let tile = factory.create_tile(region, 0, 1, 0);

        assert_eq!((tile.level(), tile.row(), tile.column()), (0, 1, 0));
        assert_eq!(tile.region(), region);
        assert_matches!(tile.wait().await, TileContent::Ready(image) => {
            assert_eq!(image.size(), Size::new(64, 64));
            assert_eq!(image.pixel(63, 63), Some([200, 100, 0, 255]));
        });
    }
}
