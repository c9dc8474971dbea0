//! Discrete level numbers of the level-of-detail pyramid that requests tiles from the
//! compositor, and their relation to the scale denominators of WMTS tile matrices.

use serde::{Deserialize, Serialize};
use tilemosaic_types::cartesian::Size;
use tilemosaic_types::geo::Datum;

/// Size of a pixel in meters assumed by OGC scale denominators (0.28 mm).
pub const STANDARDIZED_PIXEL_SIZE: f64 = 0.00028;

/// Computed levels closer than this to an integer are snapped to it before rounding up, so
/// that scale denominators of standard tile matrix sets give exact level numbers.
const LEVEL_TOLERANCE: f64 = 1e-9;

/// Parameters of the level pyramid requesting the tiles.
///
/// Level 0 of the pyramid covers `first_level_delta` degrees with one tile, every next level
/// halves the angular size of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelSetConfig {
    first_level_delta: f64,
}

impl LevelSetConfig {
    /// Creates new level set parameters. Returns `None` if the delta is not a positive finite
    /// number.
    pub fn new(first_level_delta: f64) -> Option<Self> {
        if first_level_delta.is_finite() && first_level_delta > 0.0 {
            Some(Self { first_level_delta })
        } else {
            None
        }
    }

    /// Angular size (degrees) of a tile on the first level.
    pub fn first_level_delta(&self) -> f64 {
        self.first_level_delta
    }

    /// Number of levels needed to reach the given resolution with tiles of the given size.
    ///
    /// Returns `None` if the resolution is not a positive finite number or the tile size is
    /// zero.
    pub fn num_levels_for_resolution(
        &self,
        radians_per_pixel: f64,
        tile_size: Size<u32>,
    ) -> Option<u32> {
        if !radians_per_pixel.is_finite() || radians_per_pixel <= 0.0 || tile_size.is_zero() {
            return None;
        }

        let degrees_per_pixel = radians_per_pixel.to_degrees();
        let first_level_degrees_per_pixel =
            self.first_level_delta / tile_size.width().min(tile_size.height()) as f64;

        let level = (first_level_degrees_per_pixel / degrees_per_pixel).log2();
        let level = (level - LEVEL_TOLERANCE).ceil().max(0.0);

        Some(level as u32 + 1)
    }

    /// Level number equivalent to a tile matrix with the given scale denominator and tile size.
    pub fn level_for_scale_denominator(
        &self,
        scale_denominator: f64,
        tile_size: Size<u32>,
    ) -> Option<u32> {
        let meters_per_pixel = scale_denominator * STANDARDIZED_PIXEL_SIZE;
        let radians_per_pixel = meters_per_pixel / Datum::WGS84.semimajor();

        self.num_levels_for_resolution(radians_per_pixel, tile_size)
            .map(|count| count - 1)
    }
}

impl Default for LevelSetConfig {
    fn default() -> Self {
        Self {
            first_level_delta: 90.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CRS84_LEVEL_0: f64 = 279_541_132.014_358_9;

    #[test]
    fn levels_of_standard_scale_set() {
        let config = LevelSetConfig::default();
        let tile = Size::new(256, 256);

        let levels: Vec<_> = (0..6)
            .map(|i| config.level_for_scale_denominator(CRS84_LEVEL_0 / 2f64.powi(i), tile))
            .collect();

        assert_eq!(
            levels,
            vec![Some(0), Some(0), Some(1), Some(2), Some(3), Some(4)]
        );
    }

    #[test]
    fn smaller_side_of_tile_is_used() {
        let config = LevelSetConfig::default();
        let square = config.level_for_scale_denominator(CRS84_LEVEL_0 / 8.0, Size::new(256, 256));
        let wide = config.level_for_scale_denominator(CRS84_LEVEL_0 / 8.0, Size::new(512, 256));

        assert_eq!(square, wide);
    }

    #[test]
    fn invalid_resolution() {
        let config = LevelSetConfig::default();
        let tile = Size::new(256, 256);

        assert_eq!(config.num_levels_for_resolution(0.0, tile), None);
        assert_eq!(config.num_levels_for_resolution(-1.0, tile), None);
        assert_eq!(config.num_levels_for_resolution(f64::NAN, tile), None);
        assert_eq!(config.num_levels_for_resolution(f64::INFINITY, tile), None);
        assert_eq!(config.num_levels_for_resolution(0.01, Size::new(0, 256)), None);
        assert_eq!(config.level_for_scale_denominator(0.0, tile), None);
    }

    #[test]
    fn coarse_resolution_is_first_level() {
        let config = LevelSetConfig::default();
        assert_eq!(
            config.num_levels_for_resolution(1.0, Size::new(256, 256)),
            Some(1)
        );
    }

    #[test]
    fn invalid_delta() {
        assert!(LevelSetConfig::new(36.0).is_some());
        assert!(LevelSetConfig::new(0.0).is_none());
        assert!(LevelSetConfig::new(f64::NAN).is_none());
    }
}
