//! WMTS tile matrices and tile matrix sets, and the selection of a tile matrix for a level of
//! the requesting level pyramid.

use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use tilemosaic_types::cartesian::{Point2, Size};
use tilemosaic_types::geo::{GeoPoint2d, NewGeoPoint, Projection, WebMercator};

use crate::error::MosaicError;
use crate::lod::LevelSetConfig;

/// Coordinate system of the tile matrix corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Crs {
    /// Spherical Web Mercator. Corners are `easting northing` in meters.
    Epsg3857,
    /// Geographic coordinates with EPSG axis order. Corners are `lat lon` in degrees.
    Epsg4326,
    /// Geographic coordinates with OGC axis order. Corners are `lon lat` in degrees.
    Crs84,
}

impl Crs {
    /// Recognizes the CRS from its identifier as used in capabilities documents, e.g.
    /// `urn:ogc:def:crs:EPSG::3857` or `EPSG:4326`.
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        let code = identifier
            .trim()
            .rsplit(|c: char| c == ':' || c == '/')
            .next()?;

        match code.to_ascii_uppercase().as_str() {
            "3857" | "3785" | "900913" => Some(Self::Epsg3857),
            "4326" => Some(Self::Epsg4326),
            "CRS84" => Some(Self::Crs84),
            _ => None,
        }
    }

    /// Converts a tile matrix corner into geographic coordinates.
    pub fn corner_to_geo(&self, corner: &Point2) -> Option<GeoPoint2d> {
        match self {
            Self::Epsg3857 => WebMercator::default().unproject(corner),
            Self::Epsg4326 => Some(GeoPoint2d::latlon(corner.x(), corner.y())),
            Self::Crs84 => Some(GeoPoint2d::latlon(corner.y(), corner.x())),
        }
    }
}

impl TryFrom<String> for Crs {
    type Error = MosaicError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_identifier(&value)
            .ok_or_else(|| MosaicError::InvalidMetadata(format!("unsupported CRS {value}")))
    }
}

/// One zoom level of a tiled service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TileMatrix {
    identifier: String,
    scale_denominator: f64,
    #[serde(deserialize_with = "deserialize_corner")]
    top_left_corner: Point2,
    tile_width: u32,
    tile_height: u32,
    matrix_width: u32,
    matrix_height: u32,
}

impl TileMatrix {
    /// Creates a new tile matrix.
    pub fn new(
        identifier: impl Into<String>,
        scale_denominator: f64,
        top_left_corner: Point2,
        tile_size: Size<u32>,
        matrix_size: Size<u32>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            scale_denominator,
            top_left_corner,
            tile_width: tile_size.width(),
            tile_height: tile_size.height(),
            matrix_width: matrix_size.width(),
            matrix_height: matrix_size.height(),
        }
    }

    /// Identifier of the matrix, substituted for `{TileMatrix}` in URL templates.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// OGC scale denominator.
    pub fn scale_denominator(&self) -> f64 {
        self.scale_denominator
    }

    /// Top left corner of the matrix in the coordinates of the matrix set CRS.
    pub fn top_left_corner(&self) -> Point2 {
        self.top_left_corner
    }

    /// Size of a single tile in pixels.
    pub fn tile_size(&self) -> Size<u32> {
        Size::new(self.tile_width, self.tile_height)
    }

    /// Number of tile columns and rows.
    pub fn matrix_size(&self) -> Size<u32> {
        Size::new(self.matrix_width, self.matrix_height)
    }
}

/// Parses a `"x y"` coordinate pair of a capabilities document.
pub fn parse_corner(value: &str) -> Option<Point2> {
    let mut parts = value.split_whitespace();
    let x: f64 = parts.next()?.parse().ok()?;
    let y: f64 = parts.next()?.parse().ok()?;

    if parts.next().is_some() || !x.is_finite() || !y.is_finite() {
        return None;
    }

    Some(Point2::new(x, y))
}

fn deserialize_corner<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Point2, D::Error> {
    let value = String::deserialize(deserializer)?;
    Ok(parse_corner(&value).unwrap_or_else(|| {
        log::error!("Malformed tile matrix corner '{value}', using (0, 0)");
        Point2::default()
    }))
}

/// Pyramid of tile matrices of a layer, ordered from the coarsest to the finest.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "TileMatrixSetDef")]
pub struct TileMatrixSet {
    identifier: Arc<str>,
    crs: Crs,
    matrices: Vec<TileMatrix>,
    corners: Vec<GeoPoint2d>,
}

#[derive(Deserialize)]
struct TileMatrixSetDef {
    #[serde(rename = "Identifier")]
    identifier: String,
    #[serde(rename = "SupportedCRS")]
    crs: Crs,
    #[serde(rename = "TileMatrix")]
    matrices: Vec<TileMatrix>,
}

impl From<TileMatrixSetDef> for TileMatrixSet {
    fn from(value: TileMatrixSetDef) -> Self {
        Self::new(value.identifier, value.crs, value.matrices)
    }
}

impl TileMatrixSet {
    /// Creates a new matrix set. Matrices are ordered by decreasing scale denominator, and the
    /// geographic position of every matrix corner is computed.
    pub fn new(identifier: impl Into<Arc<str>>, crs: Crs, mut matrices: Vec<TileMatrix>) -> Self {
        matrices.sort_by(|a, b| b.scale_denominator.total_cmp(&a.scale_denominator));

        let corners = matrices
            .iter()
            .map(|matrix| {
                crs.corner_to_geo(&matrix.top_left_corner)
                    .unwrap_or_else(|| {
                        log::error!(
                            "Corner of tile matrix {} cannot be converted from {crs:?}",
                            matrix.identifier
                        );
                        GeoPoint2d::default()
                    })
            })
            .collect();

        Self {
            identifier: identifier.into(),
            crs,
            matrices,
            corners,
        }
    }

    /// Parses a JSON description of the matrix set, using the element names of the WMTS
    /// capabilities document (`Identifier`, `SupportedCRS`, `TileMatrix`, ...).
    pub fn from_json(json: &str) -> Result<Self, MosaicError> {
        serde_json::from_str(json).map_err(|err| MosaicError::InvalidMetadata(err.to_string()))
    }

    /// Identifier of the set, substituted for `{TileMatrixSet}` in URL templates.
    pub fn identifier(&self) -> &Arc<str> {
        &self.identifier
    }

    /// Coordinate system of the matrix corners.
    pub fn crs(&self) -> Crs {
        self.crs
    }

    /// All matrices, from the coarsest to the finest.
    pub fn matrices(&self) -> &[TileMatrix] {
        &self.matrices
    }

    /// Matrix with the given index.
    pub fn matrix(&self, index: usize) -> Option<&TileMatrix> {
        self.matrices.get(index)
    }

    /// Top left corner of the matrix with the given index in geographic coordinates.
    pub fn top_left_geo(&self, index: usize) -> Option<GeoPoint2d> {
        self.corners.get(index).copied()
    }

    /// Selects the matrix to compose tiles of the given level from.
    ///
    /// Matrices are scanned from the coarsest. The first one with a level number exceeding
    /// the requested level stops the scan and the matrix preceding it is selected. If no
    /// matrix exceeds the level, the finest one is used. Returns `None` only for an empty set.
    pub fn select_matrix(&self, level: u32, config: &LevelSetConfig) -> Option<usize> {
        if self.matrices.is_empty() {
            return None;
        }

        for (index, matrix) in self.matrices.iter().enumerate() {
            let Some(matrix_level) =
                config.level_for_scale_denominator(matrix.scale_denominator, matrix.tile_size())
            else {
                log::warn!(
                    "Tile matrix {} of set {} has invalid scale denominator {}",
                    matrix.identifier,
                    self.identifier,
                    matrix.scale_denominator
                );
                continue;
            };

            if matrix_level > level {
                return Some(index.saturating_sub(1));
            }
        }

        Some(self.matrices.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use assert_matches::assert_matches;
    use tilemosaic_types::geo::GeoPoint;

    use super::*;
    use crate::tests::crs84_quad;

    const GOOGLE_MAPS_COMPATIBLE: &str = r#"{
        "Identifier": "GoogleMapsCompatible",
        "SupportedCRS": "urn:ogc:def:crs:EPSG::3857",
        "TileMatrix": [
            {
                "Identifier": "1",
                "ScaleDenominator": 279541132.0143589,
                "TopLeftCorner": "-20037508.3427892 20037508.3427892",
                "TileWidth": 256,
                "TileHeight": 256,
                "MatrixWidth": 2,
                "MatrixHeight": 2
            },
            {
                "Identifier": "0",
                "ScaleDenominator": 559082264.0287178,
                "TopLeftCorner": "-20037508.3427892 20037508.3427892",
                "TileWidth": 256,
                "TileHeight": 256,
                "MatrixWidth": 1,
                "MatrixHeight": 1
            }
        ]
    }"#;

    #[test]
    fn crs_identifiers() {
        assert_eq!(
            Crs::from_identifier("urn:ogc:def:crs:EPSG::3857"),
            Some(Crs::Epsg3857)
        );
        assert_eq!(Crs::from_identifier("EPSG:900913"), Some(Crs::Epsg3857));
        assert_eq!(
            Crs::from_identifier("http://www.opengis.net/def/crs/EPSG/0/4326"),
            Some(Crs::Epsg4326)
        );
        assert_eq!(
            Crs::from_identifier("urn:ogc:def:crs:OGC:1.3:CRS84"),
            Some(Crs::Crs84)
        );
        assert_eq!(Crs::from_identifier("EPSG:27700"), None);
    }

    #[test]
    fn corner_parsing() {
        assert_eq!(parse_corner("90 -180"), Some(Point2::new(90.0, -180.0)));
        assert_eq!(
            parse_corner("  -20037508.34\t20037508.34 "),
            Some(Point2::new(-20037508.34, 20037508.34))
        );
        assert_eq!(parse_corner("90"), None);
        assert_eq!(parse_corner("90 -180 0"), None);
        assert_eq!(parse_corner("north west"), None);
        assert_eq!(parse_corner("NaN 0"), None);
    }

    #[test]
    fn parses_mercator_set() {
        let set = TileMatrixSet::from_json(GOOGLE_MAPS_COMPATIBLE).unwrap();

        assert_eq!(&**set.identifier(), "GoogleMapsCompatible");
        assert_eq!(set.crs(), Crs::Epsg3857);
        let identifiers: Vec<_> = set.matrices().iter().map(|m| m.identifier()).collect();
        assert_eq!(identifiers, vec!["0", "1"]);
        assert_eq!(set.matrix(1).unwrap().matrix_size(), Size::new(2, 2));

        let corner = set.top_left_geo(0).unwrap();
        assert_abs_diff_eq!(corner.lon(), -180.0);
        assert!(corner.lat() > 85.0 && corner.lat() < 85.1);
    }

    #[test]
    fn malformed_corner_defaults_to_zero() {
        let json = GOOGLE_MAPS_COMPATIBLE.replace("-20037508.3427892 20037508.3427892", "oops");
        let set = TileMatrixSet::from_json(&json).unwrap();

        assert_eq!(set.matrix(0).unwrap().top_left_corner(), Point2::default());
        assert_abs_diff_eq!(
            set.top_left_geo(0).unwrap(),
            GeoPoint2d::latlon(0.0, 0.0),
            epsilon = 1e-9
        );
    }

    #[test]
    fn unsupported_crs_is_an_error() {
        let json = GOOGLE_MAPS_COMPATIBLE.replace("urn:ogc:def:crs:EPSG::3857", "EPSG:27700");
        assert_matches!(
            TileMatrixSet::from_json(&json),
            Err(MosaicError::InvalidMetadata(_))
        );
    }

    #[test]
    fn geographic_corners_follow_axis_order() {
        assert_eq!(
            Crs::Epsg4326.corner_to_geo(&Point2::new(90.0, -180.0)),
            Some(GeoPoint2d::latlon(90.0, -180.0))
        );
        assert_eq!(
            Crs::Crs84.corner_to_geo(&Point2::new(-180.0, 90.0)),
            Some(GeoPoint2d::latlon(90.0, -180.0))
        );
    }

    #[test]
    fn matrix_selection_steps_back_one_matrix() {
        let set = crs84_quad(6);
        let config = LevelSetConfig::default();

        // Matrix levels of this set are 0, 0, 1, 2, 3, 4.
        assert_eq!(set.select_matrix(0, &config), Some(1));
        assert_eq!(set.select_matrix(1, &config), Some(2));
        assert_eq!(set.select_matrix(3, &config), Some(4));
    }

    #[test]
    fn matrix_selection_uses_finest_matrix_for_deep_levels() {
        let set = crs84_quad(4);
        assert_eq!(set.select_matrix(20, &LevelSetConfig::default()), Some(3));
    }

    #[test]
    fn matrix_selection_is_clamped_at_coarsest() {
        let matrix = TileMatrix::new(
            "fine",
            1000.0,
            Point2::new(90.0, -180.0),
            Size::new(256, 256),
            Size::new(100, 100),
        );
        let set = TileMatrixSet::new("fine", Crs::Epsg4326, vec![matrix]);

        assert_eq!(set.select_matrix(0, &LevelSetConfig::default()), Some(0));
    }

    #[test]
    fn matrix_selection_is_monotonic() {
        let set = crs84_quad(8);
        let config = LevelSetConfig::default();

        let selected: Vec<_> = (0..12)
            .map(|level| set.select_matrix(level, &config).unwrap())
            .collect();
        assert!(selected.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn matrices_are_ordered_from_coarsest() {
        let mut matrices = crs84_quad(3).matrices().to_vec();
        matrices.reverse();
        let set = TileMatrixSet::new("reversed", Crs::Epsg4326, matrices);

        let identifiers: Vec<_> = set.matrices().iter().map(|m| m.identifier()).collect();
        assert_eq!(identifiers, vec!["0", "1", "2"]);
    }

    #[test]
    fn empty_set_has_no_suitable_matrix() {
        let set = TileMatrixSet::new("empty", Crs::Epsg4326, vec![]);
        assert_eq!(set.select_matrix(0, &LevelSetConfig::default()), None);
    }
}
