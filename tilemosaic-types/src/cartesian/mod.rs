//! Projected coordinates and pixel sizes.

mod point;
mod size;

pub use point::Point2;
pub use size::Size;
