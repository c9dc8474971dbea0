use tilemosaic_types::cartesian::Size;
use tilemosaic_types::geo::{GeoPoint, GeoPoint2d, GeoRegion};

/// Distances (degrees) below this are treated as zero when locating tiles.
pub(crate) const NEAR_ZERO: f64 = 1e-6;

/// Tile grid of a matrix in geographic coordinates.
///
/// The grid starts at the top left corner of the matrix clipped by the layer bounding box and
/// divides the rest of the bounding box into `columns x rows` equal cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct MatrixGrid {
    min_lon: f64,
    max_lat: f64,
    tile_width: f64,
    tile_height: f64,
    columns: u32,
    rows: u32,
}

/// Inclusive rectangle of tile indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TileRange {
    pub(crate) min_row: u32,
    pub(crate) max_row: u32,
    pub(crate) min_column: u32,
    pub(crate) max_column: u32,
}

impl TileRange {
    pub(crate) fn rows(&self) -> u32 {
        self.max_row - self.min_row + 1
    }

    pub(crate) fn columns(&self) -> u32 {
        self.max_column - self.min_column + 1
    }

    /// All `(row, column)` pairs, row by row.
    pub(crate) fn cells(&self) -> impl Iterator<Item = (u32, u32)> {
        let columns = self.min_column..=self.max_column;
        (self.min_row..=self.max_row)
            .flat_map(move |row| columns.clone().map(move |column| (row, column)))
    }
}

impl MatrixGrid {
    /// Returns `None` if the grid cells would have no area.
    pub(crate) fn new(
        top_left: GeoPoint2d,
        matrix_size: Size<u32>,
        bounds: &GeoRegion,
    ) -> Option<Self> {
        if matrix_size.is_zero() {
            return None;
        }

        let min_lon = bounds.min_lon().max(top_left.lon());
        let max_lat = bounds.max_lat().min(top_left.lat());
        let tile_width = (bounds.max_lon() - min_lon) / matrix_size.width() as f64;
        let tile_height = (max_lat - bounds.min_lat()) / matrix_size.height() as f64;

        if !(tile_width > NEAR_ZERO && tile_height > NEAR_ZERO) {
            return None;
        }

        Some(Self {
            min_lon,
            max_lat,
            tile_width,
            tile_height,
            columns: matrix_size.width(),
            rows: matrix_size.height(),
        })
    }

    /// Region covered by all the tiles of the grid.
    pub(crate) fn extent(&self) -> Option<GeoRegion> {
        self.range_region(&TileRange {
            min_row: 0,
            max_row: self.rows - 1,
            min_column: 0,
            max_column: self.columns - 1,
        })
    }

    /// Tiles overlapping the region. Returns `None` if the region is outside of the grid.
    ///
    /// An edge of the region lying on a tile boundary (within [`NEAR_ZERO`]) does not pull in
    /// the tile on the other side of the boundary.
    pub(crate) fn covering_range(&self, region: &GeoRegion) -> Option<TileRange> {
        if !self.extent()?.intersects(region) {
            return None;
        }

        let min_column = first_index(
            region.min_lon() - self.min_lon,
            self.tile_width,
            self.columns,
        );
        let max_column = last_index(
            region.max_lon() - self.min_lon,
            self.tile_width,
            self.columns,
        )
        .max(min_column);
        let min_row = first_index(self.max_lat - region.max_lat(), self.tile_height, self.rows);
        let max_row =
            last_index(self.max_lat - region.min_lat(), self.tile_height, self.rows).max(min_row);

        Some(TileRange {
            min_row,
            max_row,
            min_column,
            max_column,
        })
    }

    /// Region covered by one tile.
    pub(crate) fn cell_region(&self, row: u32, column: u32) -> Option<GeoRegion> {
        self.range_region(&TileRange {
            min_row: row,
            max_row: row,
            min_column: column,
            max_column: column,
        })
    }

    /// Region covered by all tiles of the range.
    pub(crate) fn range_region(&self, range: &TileRange) -> Option<GeoRegion> {
        GeoRegion::new(
            self.max_lat - self.tile_height * (range.max_row + 1) as f64,
            self.max_lat - self.tile_height * range.min_row as f64,
            self.min_lon + self.tile_width * range.min_column as f64,
            self.min_lon + self.tile_width * (range.max_column + 1) as f64,
        )
    }
}

/// Index of the tile containing the leading edge at `offset` degrees from the grid origin.
fn first_index(offset: f64, tile_size: f64, count: u32) -> u32 {
    if offset.abs() < NEAR_ZERO || offset < 0.0 {
        return 0;
    }

    let mut index = (offset / tile_size).floor();
    if (index + 1.0) * tile_size - offset < NEAR_ZERO {
        index += 1.0;
    }

    clamp_index(index, count)
}

/// Index of the tile containing the trailing edge at `offset` degrees from the grid origin.
fn last_index(offset: f64, tile_size: f64, count: u32) -> u32 {
    if offset.abs() < NEAR_ZERO || offset < 0.0 {
        return 0;
    }

    let mut index = (offset / tile_size).floor();
    if offset - index * tile_size < NEAR_ZERO {
        index -= 1.0;
    }

    clamp_index(index, count)
}

fn clamp_index(index: f64, count: u32) -> u32 {
    index.clamp(0.0, count.saturating_sub(1) as f64) as u32
}
