//! Value types shared by the `tilemosaic` crates.
//!
//! * [`geo`] contains geographic points and regions (latitude and longitude in degrees), the
//!   [`Projection`](geo::Projection) trait and the spherical [`WebMercator`](geo::WebMercator)
//!   projection used to bring tile matrix corners into geographic coordinates.
//! * [`cartesian`] contains projected points and pixel sizes.

pub mod cartesian;
pub mod error;
pub mod geo;

pub use cartesian::{Point2, Size};
pub use geo::{GeoPoint, GeoPoint2d, GeoRegion, NewGeoPoint};
