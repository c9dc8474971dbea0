use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::TypesError;

/// Axis aligned rectangle in geographic coordinates (degrees).
///
/// Bounds are always finite and `min <= max` on both axes. Zero-size regions are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RegionBounds", into = "RegionBounds")]
pub struct GeoRegion {
    min_lat: f64,
    max_lat: f64,
    min_lon: f64,
    max_lon: f64,
}

#[derive(Serialize, Deserialize)]
struct RegionBounds {
    min_lat: f64,
    max_lat: f64,
    min_lon: f64,
    max_lon: f64,
}

impl GeoRegion {
    /// Creates a new region. Returns `None` if any of the values is not finite or if a minimum
    /// is larger than the corresponding maximum.
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Option<Self> {
        let all_finite = [min_lat, max_lat, min_lon, max_lon]
            .iter()
            .all(|v| v.is_finite());
        if !all_finite || min_lat > max_lat || min_lon > max_lon {
            return None;
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        })
    }

    /// Creates a region from its south-west corner and its span. Spans must be non-negative.
    pub fn from_span(min_lat: f64, min_lon: f64, delta_lat: f64, delta_lon: f64) -> Option<Self> {
        Self::new(min_lat, min_lat + delta_lat, min_lon, min_lon + delta_lon)
    }

    /// The whole globe.
    pub fn full_sphere() -> Self {
        Self {
            min_lat: -90.0,
            max_lat: 90.0,
            min_lon: -180.0,
            max_lon: 180.0,
        }
    }

    /// Southern bound.
    pub fn min_lat(&self) -> f64 {
        self.min_lat
    }

    /// Northern bound.
    pub fn max_lat(&self) -> f64 {
        self.max_lat
    }

    /// Western bound.
    pub fn min_lon(&self) -> f64 {
        self.min_lon
    }

    /// Eastern bound.
    pub fn max_lon(&self) -> f64 {
        self.max_lon
    }

    /// Latitude span in degrees.
    pub fn delta_lat(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Longitude span in degrees.
    pub fn delta_lon(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Returns true if either span is zero.
    pub fn is_degenerate(&self) -> bool {
        self.delta_lat() == 0.0 || self.delta_lon() == 0.0
    }

    /// Smallest region containing both `self` and `other`.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min_lat: self.min_lat.min(other.min_lat),
            max_lat: self.max_lat.max(other.max_lat),
            min_lon: self.min_lon.min(other.min_lon),
            max_lon: self.max_lon.max(other.max_lon),
        }
    }

    /// Returns true if the regions share any area or boundary.
    pub fn intersects(&self, other: &Self) -> bool {
        self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
            && self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
    }
}

impl Eq for GeoRegion {}

impl Hash for GeoRegion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for value in [self.min_lat, self.max_lat, self.min_lon, self.max_lon] {
            // `0.0 == -0.0`, so both must hash the same.
            let value = if value == 0.0 { 0.0 } else { value };
            value.to_bits().hash(state);
        }
    }
}

impl TryFrom<RegionBounds> for GeoRegion {
    type Error = TypesError;

    fn try_from(value: RegionBounds) -> Result<Self, Self::Error> {
        Self::new(value.min_lat, value.max_lat, value.min_lon, value.max_lon).ok_or_else(|| {
            TypesError::InvalidRegion(format!(
                "lat [{}, {}], lon [{}, {}]",
                value.min_lat, value.max_lat, value.min_lon, value.max_lon
            ))
        })
    }
}

impl From<GeoRegion> for RegionBounds {
    fn from(value: GeoRegion) -> Self {
        Self {
            min_lat: value.min_lat,
            max_lat: value.max_lat,
            min_lon: value.min_lon,
            max_lon: value.max_lon,
        }
    }
}
