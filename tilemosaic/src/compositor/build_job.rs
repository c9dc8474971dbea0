use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tilemosaic_types::cartesian::Size;
use tilemosaic_types::geo::GeoRegion;
use tokio::task::AbortHandle;

use super::grid::{MatrixGrid, TileRange, NEAR_ZERO};
use super::request::{BuildJobKey, TileRequest};
use super::scratch::{CropRect, PlacedTile, ScratchCanvas};
use crate::decoded_image::DecodedImage;
use crate::error::MosaicError;
use crate::lod::LevelSetConfig;
use crate::wmts::TileAddress;

/// Identifier of a build job, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct JobId(u64);

impl JobId {
    pub(crate) fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BuildState {
    Created,
    MatrixSelected,
    AwaitingTiles,
    Stitching,
    Done,
    Unavailable,
}

/// Raw tile the job needs and the fetch serving it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlannedFetch {
    pub(crate) url: String,
    pub(crate) footprint: GeoRegion,
    pub(crate) row: u32,
    pub(crate) column: u32,
}

#[derive(Debug)]
struct TileCell {
    url: Option<String>,
    row: u32,
    column: u32,
    image: Option<Arc<DecodedImage>>,
    completed: bool,
}

/// Composition of one output tile from raw tiles of a matrix.
///
/// The job is driven by the dispatcher worker only, so its state needs no synchronization.
#[derive(Debug)]
pub(crate) struct CompositeTileBuildJob {
    id: JobId,
    key: BuildJobKey,
    request: TileRequest,
    state: BuildState,
    matrix_index: Option<usize>,
    tile_size: Size<u32>,
    mosaic_size: Size<u32>,
    range: Option<TileRange>,
    stitch_region: Option<GeoRegion>,
    cells: Vec<TileCell>,
    expected: usize,
    completed: usize,
    deadline: Option<AbortHandle>,
}

impl CompositeTileBuildJob {
    pub(crate) fn new(request: TileRequest) -> Self {
        Self {
            id: JobId::next(),
            key: request.key(),
            request,
            state: BuildState::Created,
            matrix_index: None,
            tile_size: Size::default(),
            mosaic_size: Size::default(),
            range: None,
            stitch_region: None,
            cells: vec![],
            expected: 0,
            completed: 0,
            deadline: None,
        }
    }

    pub(crate) fn id(&self) -> JobId {
        self.id
    }

    pub(crate) fn key(&self) -> &BuildJobKey {
        &self.key
    }

    pub(crate) fn state(&self) -> BuildState {
        self.state
    }

    /// Attaches the timer task of the job deadline. The task is aborted when the job is dropped.
    pub(crate) fn set_deadline(&mut self, deadline: AbortHandle) {
        self.deadline = Some(deadline);
    }

    pub(crate) fn fail(&mut self) {
        self.state = BuildState::Unavailable;
    }

    /// `Created -> MatrixSelected`.
    pub(crate) fn select_matrix(&mut self, level_set: &LevelSetConfig) -> Result<(), MosaicError> {
        if self.state != BuildState::Created {
            return Err(MosaicError::Generic(format!(
                "cannot select matrix in state {:?}",
                self.state
            )));
        }

        if self.request.desired_size.is_zero() {
            return Err(MosaicError::InvalidRequest("output size is zero".into()));
        }

        let index = self
            .request
            .matrix_set
            .select_matrix(self.request.level, level_set)
            .ok_or(MosaicError::NoSuitableMatrix)?;

        log::trace!(
            "Job {:?}: matrix {index} of {} selected for level {}",
            self.id,
            self.request.matrix_set.identifier(),
            self.request.level
        );

        self.matrix_index = Some(index);
        self.state = BuildState::MatrixSelected;
        Ok(())
    }

    /// `MatrixSelected -> AwaitingTiles`. Returns the distinct raw tiles to fetch.
    ///
    /// Fails if the mosaic of the covering tiles would be larger than `max_mosaic_dimension`
    /// pixels on either side.
    pub(crate) fn plan_tiles(
        &mut self,
        max_mosaic_dimension: u32,
    ) -> Result<Vec<PlannedFetch>, MosaicError> {
        let index = match (self.state, self.matrix_index) {
            (BuildState::MatrixSelected, Some(index)) => index,
            _ => {
                return Err(MosaicError::Generic(format!(
                    "cannot plan tiles in state {:?}",
                    self.state
                )))
            }
        };

        let matrix_set = self.request.matrix_set.clone();
        let (Some(matrix), Some(top_left)) = (matrix_set.matrix(index), matrix_set.top_left_geo(index))
        else {
            return Err(MosaicError::NoSuitableMatrix);
        };

        let grid = MatrixGrid::new(
            top_left,
            matrix.matrix_size(),
            &self.request.layer.bounding_box(),
        )
        .ok_or_else(|| {
            MosaicError::InvalidMetadata(format!(
                "tile matrix {} has a degenerate grid",
                matrix.identifier()
            ))
        })?;

        let range = grid.covering_range(&self.request.region).ok_or_else(|| {
            MosaicError::InvalidRequest(format!(
                "region {:?} is outside of tile matrix {}",
                self.request.region,
                matrix.identifier()
            ))
        })?;
        let stitch_region = grid.range_region(&range).ok_or_else(|| {
            MosaicError::InvalidMetadata(format!(
                "tile matrix {} has a degenerate grid",
                matrix.identifier()
            ))
        })?;

        let tile_size = matrix.tile_size();
        let mosaic_size =
            mosaic_size(&range, tile_size, max_mosaic_dimension).ok_or_else(|| {
                MosaicError::InvalidRequest(format!(
                    "{}x{} tiles of matrix {} exceed the mosaic limit of {max_mosaic_dimension} pixels",
                    range.columns(),
                    range.rows(),
                    matrix.identifier()
                ))
            })?;

        let mut planned = vec![];
        let mut seen = HashSet::new();
        for (row, column) in range.cells() {
            let address = TileAddress {
                layer: self.request.layer.identifier(),
                matrix_set: matrix_set.identifier(),
                matrix: matrix.identifier(),
                row,
                column,
            };

            let resolved = self
                .request
                .url_template
                .resolve(&address)
                .and_then(|url| match grid.cell_region(row, column) {
                    Some(footprint) => Ok((url, footprint)),
                    None => Err(MosaicError::InvalidMetadata("degenerate tile".into())),
                });

            let (url, footprint) = match resolved {
                Ok(resolved) => resolved,
                Err(err) => {
                    log::warn!("Job {:?}: tile ({row}, {column}) skipped: {err}", self.id);
                    self.cells.push(TileCell {
                        url: None,
                        row,
                        column,
                        image: None,
                        completed: true,
                    });
                    continue;
                }
            };

            if seen.insert(url.clone()) {
                planned.push(PlannedFetch {
                    url: url.clone(),
                    footprint,
                    row,
                    column,
                });
            }

            self.cells.push(TileCell {
                url: Some(url),
                row,
                column,
                image: None,
                completed: false,
            });
        }

        if planned.is_empty() {
            return Err(MosaicError::InvalidTemplate(format!(
                "no tile URL can be built from {}",
                self.request.url_template.as_str()
            )));
        }

        self.expected = planned.len();
        self.tile_size = tile_size;
        self.mosaic_size = mosaic_size;
        self.range = Some(range);
        self.stitch_region = Some(stitch_region);
        self.state = BuildState::AwaitingTiles;

        Ok(planned)
    }

    /// Registers the result of a raw tile fetch. Returns true if the job has all its tiles and
    /// moved to `Stitching`.
    pub(crate) fn tile_complete(&mut self, url: &str, image: Option<Arc<DecodedImage>>) -> bool {
        if self.state != BuildState::AwaitingTiles {
            return false;
        }

        let mut matched = false;
        for cell in self
            .cells
            .iter_mut()
            .filter(|cell| !cell.completed && cell.url.as_deref() == Some(url))
        {
            cell.image = image.clone();
            cell.completed = true;
            matched = true;
        }

        if !matched {
            return false;
        }

        self.completed += 1;
        if self.completed == self.expected {
            self.state = BuildState::Stitching;
            true
        } else {
            false
        }
    }

    /// Stops waiting for the missing tiles. Returns true if the job moved to `Stitching`.
    pub(crate) fn expire(&mut self) -> bool {
        if self.state != BuildState::AwaitingTiles {
            return false;
        }

        log::warn!(
            "Job {:?}: deadline reached with {} of {} tiles, composing partial tile",
            self.id,
            self.completed,
            self.expected
        );
        self.state = BuildState::Stitching;
        true
    }

    pub(crate) fn completed_tiles(&self) -> usize {
        self.completed
    }

    /// `Stitching -> Done`. Produces the output image.
    pub(crate) fn stitch(&mut self, canvas: &mut ScratchCanvas) -> Option<DecodedImage> {
        if self.state != BuildState::Stitching {
            return None;
        }

        let (Some(range), Some(stitch_region)) = (self.range, self.stitch_region) else {
            self.state = BuildState::Unavailable;
            return None;
        };

        let tile_size = self.tile_size;
        let mosaic_size = self.mosaic_size;

        let Some(crop) = crop_rect(&self.request.region, &stitch_region, mosaic_size) else {
            self.state = BuildState::Unavailable;
            return None;
        };

        let tiles = self.cells.iter().filter_map(|cell| {
            cell.image.as_deref().map(|image| PlacedTile {
                x: (cell.column - range.min_column) * tile_size.width(),
                y: (cell.row - range.min_row) * tile_size.height(),
                image,
            })
        });

        let image = canvas.compose(
            mosaic_size,
            tile_size,
            tiles,
            crop,
            self.request.desired_size,
        );

        self.state = match image {
            Some(_) => BuildState::Done,
            None => BuildState::Unavailable,
        };
        image
    }
}

impl Drop for CompositeTileBuildJob {
    fn drop(&mut self) {
        if let Some(deadline) = self.deadline.take() {
            deadline.abort();
        }
    }
}

fn mosaic_size(range: &TileRange, tile_size: Size<u32>, max_dimension: u32) -> Option<Size<u32>> {
    let width = range.columns().checked_mul(tile_size.width())?;
    let height = range.rows().checked_mul(tile_size.height())?;

    (width <= max_dimension && height <= max_dimension).then(|| Size::new(width, height))
}

/// Area of the mosaic covering the requested region. It extends past the mosaic where the
/// requested region extends past the stitched one.
fn crop_rect(requested: &GeoRegion, stitched: &GeoRegion, mosaic: Size<u32>) -> Option<CropRect> {
    if stitched.delta_lon() < NEAR_ZERO || stitched.delta_lat() < NEAR_ZERO || mosaic.is_zero() {
        return None;
    }

    let width = mosaic.width() as f64;
    let height = mosaic.height() as f64;

    Some(CropRect {
        x: (requested.min_lon() - stitched.min_lon()) / stitched.delta_lon() * width,
        y: (stitched.max_lat() - requested.max_lat()) / stitched.delta_lat() * height,
        width: requested.delta_lon() / stitched.delta_lon() * width,
        height: requested.delta_lat() / stitched.delta_lat() * height,
    })
}
