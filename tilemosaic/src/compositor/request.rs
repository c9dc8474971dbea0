use std::sync::Arc;

use tilemosaic_types::cartesian::Size;
use tilemosaic_types::geo::GeoRegion;

use crate::tile_matrix::TileMatrixSet;
use crate::wmts::{UrlTemplate, WmtsLayer};

/// Request to compose one output tile.
#[derive(Debug, Clone)]
pub struct TileRequest {
    /// Geographic region the output tile covers.
    pub region: GeoRegion,
    /// Level of the output tile in the requesting pyramid.
    pub level: u32,
    /// Layer the raw tiles belong to.
    pub layer: Arc<WmtsLayer>,
    /// Tile matrix set of the layer.
    pub matrix_set: Arc<TileMatrixSet>,
    /// Template of the raw tile URLs.
    pub url_template: UrlTemplate,
    /// Size of the output tile in pixels.
    pub desired_size: Size<u32>,
}

impl TileRequest {
    /// Identity of the build job serving the request.
    pub fn key(&self) -> BuildJobKey {
        BuildJobKey {
            region: self.region,
            matrix_set: self.matrix_set.identifier().clone(),
            layer: self.layer.identifier().to_string(),
            url_template: self.url_template.shared(),
            desired_size: self.desired_size,
            level: self.level,
        }
    }
}

/// Identity of a build job. Requests with equal keys are served by a single job.
///
/// The layer and the URL template are a part of the key, so that layers sharing a tile matrix
/// set identifier are never mixed up.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildJobKey {
    region: GeoRegion,
    matrix_set: Arc<str>,
    layer: String,
    url_template: Arc<str>,
    desired_size: Size<u32>,
    level: u32,
}

impl BuildJobKey {
    /// Requested region.
    pub fn region(&self) -> GeoRegion {
        self.region
    }

    /// Level of the output tile.
    pub fn level(&self) -> u32 {
        self.level
    }
}
