//! Error types used by the crate.

use image::ImageError;
use thiserror::Error;

/// Tilemosaic error type.
///
/// Errors of the fetch pipeline never reach the caller of
/// [`Dispatcher::submit_build_request`](crate::Dispatcher::submit_build_request): a failed
/// raw tile becomes a blank cell of the mosaic and a failed build job marks its destinations
/// as unavailable. The error values are still returned by the lower level APIs (byte sources,
/// metadata parsing, URL templates) and are written to the log.
#[derive(Debug, Error)]
pub enum MosaicError {
    /// Network transfer failed.
    #[error("failed to load data: {0}")]
    Io(String),
    /// Server answered with a non-success status code.
    #[error("server responded with status {0}")]
    HttpStatus(u16),
    /// Image decoding error.
    #[error("image decode error: {0:?}")]
    ImageDecode(#[from] ImageError),
    /// Error reading data from the file system.
    #[error("failed to read file")]
    FsIo(#[from] std::io::Error),
    /// The fetch pool is saturated and its wait queue is full.
    #[error("fetch rejected, the pool is saturated")]
    Rejected,
    /// A fetch was rejected by the pool on every allowed attempt.
    #[error("fetch rejected {0} times, giving up")]
    RetriesExhausted(u32),
    /// Tile matrix set has no matrices to choose from.
    #[error("no suitable tile matrix")]
    NoSuitableMatrix,
    /// URL template cannot be resolved for a tile.
    #[error("invalid url template: {0}")]
    InvalidTemplate(String),
    /// Tile matrix set or layer description cannot be used.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
    /// Dispatcher configuration cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Build request cannot produce an image.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The dispatcher worker is not running anymore.
    #[error("dispatcher is stopped")]
    DispatcherStopped,
    /// Generic error - details are inside.
    #[error("{0}")]
    Generic(String),
}

impl From<reqwest::Error> for MosaicError {
    fn from(value: reqwest::Error) -> Self {
        match value.status() {
            Some(status) => Self::HttpStatus(status.as_u16()),
            None => Self::Io(value.to_string()),
        }
    }
}
