//! Tilemosaic composes map tiles for arbitrary geographic regions out of the raw tiles of a
//! WMTS layer.
//!
//! A client that draws a tile pyramid of its own (for example a globe or a map in a
//! non-standard projection) rarely has tiles lining up with the tile matrices of a WMTS
//! server. For every tile it needs, it asks a [`Dispatcher`] for an image of a geographic
//! region. The dispatcher selects a matching tile matrix, loads the raw tiles overlapping the
//! region, stitches them, cuts the region out and scales it to the requested size.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tilemosaic::tilemosaic_types::geo::GeoRegion;
//! use tilemosaic::{
//!     CompositeTileFactory, DispatcherBuilder, TileContent, TileMatrixSet, UrlTemplate, WmtsLayer,
//! };
//!
//! # async fn run(matrix_set_json: &str) -> anyhow::Result<()> {
//! let dispatcher = DispatcherBuilder::new_http().build()?;
//! let factory = CompositeTileFactory::new(
//!     dispatcher,
//!     Arc::new(WmtsLayer::new("BlueMarble", None)),
//!     Arc::new(TileMatrixSet::from_json(matrix_set_json)?),
//!     UrlTemplate::new("https://example.com/wmts/{Layer}/{TileMatrix}/{TileRow}/{TileCol}.jpg"),
//! );
//!
//! let region = GeoRegion::new(0.0, 45.0, 0.0, 45.0).expect("valid region");
//! let tile = factory.create_tile(region, 2, 0, 4);
//! if let TileContent::Ready(image) = tile.wait().await {
//!     println!("Composed {}x{} tile", image.width(), image.height());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Main components
//!
//! * [`Dispatcher`] accepts [`TileRequest`]s. Equal requests are served by one build job and
//!   every raw tile is fetched once however many jobs need it. Results go to
//!   [`TileDestination`]s, such as [`ImageTile`].
//! * [`TileMatrixSet`] and [`WmtsLayer`] describe the WMTS source. They can be deserialized
//!   from the JSON form of a capabilities document.
//! * [`ByteSource`] loads raw tile bytes. [`HttpByteSource`] is used unless a custom source
//!   is given to the [`DispatcherBuilder`].
//! * [`Messenger`] is notified whenever a tile is ready, so the client can redraw.

pub mod compositor;
pub mod decoded_image;
pub mod error;
mod factory;
pub mod lod;
pub mod messenger;
pub mod tile;
pub mod tile_matrix;
pub mod transport;
pub mod wmts;

#[cfg(test)]
pub(crate) mod tests;

pub use compositor::{
    BuildJobKey, Dispatcher, DispatcherBuilder, DispatcherConfig, DispatcherStats, RetryPolicy,
    Submission, TileRequest,
};
pub use decoded_image::DecodedImage;
pub use error::MosaicError;
pub use factory::CompositeTileFactory;
pub use lod::LevelSetConfig;
pub use messenger::Messenger;
pub use tile::{ImageTile, TileContent, TileDestination};
pub use tile_matrix::{Crs, TileMatrix, TileMatrixSet};
pub use transport::{ByteSource, HttpByteSource};
pub use wmts::{TileAddress, UrlTemplate, WmtsLayer};
pub use tilemosaic_types;
