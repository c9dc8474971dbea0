use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use crate::cartesian::Point2;
use crate::geo::datum::Datum;
use crate::geo::point::{GeoPoint, GeoPoint2d, NewGeoPoint};

/// Conversion between two coordinate systems.
pub trait Projection {
    /// Type of the point before projection.
    type InPoint;
    /// Type of the point after projection.
    type OutPoint;

    /// Projects a point. Returns `None` if the point cannot be represented in the output system.
    fn project(&self, input: &Self::InPoint) -> Option<Self::OutPoint>;
    /// Inverse of [`Projection::project`].
    fn unproject(&self, input: &Self::OutPoint) -> Option<Self::InPoint>;
}

/// Spherical Mercator projection (EPSG:3857).
///
/// Unprojected coordinates are clamped to `[-90, 90]` latitude and `[-180, 180]` longitude, so
/// corners given slightly outside the valid extent of a tile matrix set still map to the globe.
#[derive(Debug, Copy, Clone)]
pub struct WebMercator {
    datum: Datum,
}

impl WebMercator {
    /// Creates a projection on the given datum. Only the semi-major axis is used.
    pub fn new(datum: Datum) -> Self {
        Self { datum }
    }

    /// Radius of the sphere in meters.
    pub fn radius(&self) -> f64 {
        self.datum.semimajor()
    }
}

impl Default for WebMercator {
    fn default() -> Self {
        Self::new(Datum::MERCATOR_SPHERE)
    }
}

impl Projection for WebMercator {
    type InPoint = GeoPoint2d;
    type OutPoint = Point2;

    fn project(&self, input: &GeoPoint2d) -> Option<Point2> {
        let x = self.radius() * input.lon_rad();
        let y = self.radius() * (FRAC_PI_4 + input.lat_rad() / 2.0).tan().ln();

        if x.is_finite() && y.is_finite() {
            Some(Point2::new(x, y))
        } else {
            None
        }
    }

    fn unproject(&self, input: &Point2) -> Option<GeoPoint2d> {
        if !input.x().is_finite() || !input.y().is_finite() {
            return None;
        }

        let lat = FRAC_PI_2 - 2.0 * (-input.y() / self.radius()).exp().atan();
        let lon = input.x() / self.radius();

        Some(GeoPoint2d::latlon(
            lat.to_degrees().clamp(-90.0, 90.0),
            lon.to_degrees().clamp(-180.0, 180.0),
        ))
    }
}
