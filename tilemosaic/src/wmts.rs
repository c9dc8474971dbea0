//! Layer metadata and tile URL templates of a WMTS service.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tilemosaic_types::geo::GeoRegion;

use crate::error::MosaicError;

/// Layer of a WMTS service as described by the capabilities document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WmtsLayer {
    identifier: String,
    #[serde(default)]
    wgs84_bounding_box: Option<GeoRegion>,
}

impl WmtsLayer {
    /// Creates a new layer description.
    pub fn new(identifier: impl Into<String>, wgs84_bounding_box: Option<GeoRegion>) -> Self {
        Self {
            identifier: identifier.into(),
            wgs84_bounding_box,
        }
    }

    /// Identifier of the layer, substituted for `{Layer}` in URL templates.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Geographic extent of the layer. Layers that do not declare one cover the whole globe.
    pub fn bounding_box(&self) -> GeoRegion {
        self.wgs84_bounding_box
            .unwrap_or_else(GeoRegion::full_sphere)
    }
}

/// Position of a raw tile in the service.
#[derive(Debug, Clone, Copy)]
pub struct TileAddress<'a> {
    /// Layer identifier.
    pub layer: &'a str,
    /// Tile matrix set identifier.
    pub matrix_set: &'a str,
    /// Tile matrix identifier.
    pub matrix: &'a str,
    /// Row of the tile, counted from the top of the matrix.
    pub row: u32,
    /// Column of the tile, counted from the left of the matrix.
    pub column: u32,
}

/// Template of raw tile URLs, e.g.
/// `https://example.com/wmts/{Layer}/{TileMatrixSet}/{TileMatrix}/{TileRow}/{TileCol}.png`.
///
/// Supported placeholders are `{TileMatrix}`, `{TileRow}`, `{TileCol}`, `{TileMatrixSet}` and
/// `{Layer}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UrlTemplate(Arc<str>);

impl UrlTemplate {
    /// Creates a new template.
    pub fn new(template: impl Into<Arc<str>>) -> Self {
        Self(template.into())
    }

    /// Template text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn shared(&self) -> Arc<str> {
        self.0.clone()
    }

    /// Builds the URL of a tile.
    pub fn resolve(&self, tile: &TileAddress<'_>) -> Result<String, MosaicError> {
        let mut vars = HashMap::with_capacity(5);
        vars.insert("TileMatrix".to_string(), tile.matrix.to_string());
        vars.insert("TileRow".to_string(), tile.row.to_string());
        vars.insert("TileCol".to_string(), tile.column.to_string());
        vars.insert("TileMatrixSet".to_string(), tile.matrix_set.to_string());
        vars.insert("Layer".to_string(), tile.layer.to_string());

        strfmt::strfmt(&self.0, &vars)
            .map_err(|err| MosaicError::InvalidTemplate(format!("{}: {err}", self.0)))
    }
}
