//! Geographic coordinates (latitude and longitude in degrees) and conversion from projected
//! coordinates (see [`Projection`]).

mod datum;
mod point;
mod projection;
mod region;

pub use datum::Datum;
pub use point::{GeoPoint, GeoPoint2d, NewGeoPoint};
pub use projection::{Projection, WebMercator};
pub use region::GeoRegion;
