//! Error type used by the crate.

use thiserror::Error;

/// Error enum.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TypesError {
    /// Region bounds are not finite or one of the axes is inverted.
    #[error("invalid region: {0}")]
    InvalidRegion(String),
}
