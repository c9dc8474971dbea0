//! Destinations of composed tiles.

use std::sync::Arc;

use parking_lot::Mutex;
use tilemosaic_types::geo::GeoRegion;
use tokio::sync::Notify;

use crate::decoded_image::DecodedImage;

/// Receiver of the result of a build request.
///
/// Exactly one of the methods is called once for every submitted request. The calls come from
/// the dispatcher worker task, so implementations must not block.
pub trait TileDestination: Send + Sync {
    /// The tile was composed.
    fn publish(&self, image: Arc<DecodedImage>);
    /// The tile cannot be composed.
    fn unavailable(&self);
}

/// State of an [`ImageTile`].
#[derive(Debug, Clone)]
pub enum TileContent {
    /// The tile is being composed.
    Pending,
    /// The tile image is ready.
    Ready(Arc<DecodedImage>),
    /// The tile cannot be composed.
    Unavailable,
}

/// Tile of the requesting level pyramid, filled by the dispatcher.
#[derive(Debug)]
pub struct ImageTile {
    region: GeoRegion,
    level: u32,
    row: u32,
    column: u32,
    content: Mutex<TileContent>,
    changed: Notify,
}

impl ImageTile {
    /// Creates a new pending tile.
    pub fn new(region: GeoRegion, level: u32, row: u32, column: u32) -> Self {
        Self {
            region,
            level,
            row,
            column,
            content: Mutex::new(TileContent::Pending),
            changed: Notify::new(),
        }
    }

    /// Geographic region covered by the tile.
    pub fn region(&self) -> GeoRegion {
        self.region
    }

    /// Level of the tile in the requesting pyramid.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Row of the tile in its level.
    pub fn row(&self) -> u32 {
        self.row
    }

    /// Column of the tile in its level.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Current state of the tile.
    pub fn content(&self) -> TileContent {
        self.content.lock().clone()
    }

    /// Composed image, if ready.
    pub fn image(&self) -> Option<Arc<DecodedImage>> {
        match &*self.content.lock() {
            TileContent::Ready(image) => Some(image.clone()),
            _ => None,
        }
    }

    /// Waits until the tile is either ready or unavailable.
    pub async fn wait(&self) -> TileContent {
        loop {
            let changed = self.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            let content = self.content();
            if !matches!(content, TileContent::Pending) {
                return content;
            }

            changed.await;
        }
    }

    fn set_content(&self, content: TileContent) {
        *self.content.lock() = content;
        self.changed.notify_waiters();
    }
}

impl TileDestination for ImageTile {
    fn publish(&self, image: Arc<DecodedImage>) {
        self.set_content(TileContent::Ready(image));
    }

    fn unavailable(&self) {
        self.set_content(TileContent::Unavailable);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use tilemosaic_types::cartesian::Size;

    use super::*;

    fn tile() -> Arc<ImageTile> {
        Arc::new(ImageTile::new(GeoRegion::full_sphere(), 0, 0, 0))
    }

    #[test]
    fn new_tile_is_pending() {
        let tile = tile();
        assert_matches!(tile.content(), TileContent::Pending);
        assert!(tile.image().is_none());
    }

    #[tokio::test]
    async fn wait_returns_published_image() {
        let tile = tile();
        let waiter = tokio::spawn({
            let tile = tile.clone();
            async move { tile.wait().await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let image = DecodedImage::from_raw(vec![0; 4], Size::new(1, 1)).unwrap();
        tile.publish(Arc::new(image.clone()));

        assert_matches!(waiter.await.unwrap(), TileContent::Ready(ready) if *ready == image);
        assert_eq!(tile.image().as_deref(), Some(&image));
    }

    #[tokio::test]
    async fn wait_on_finished_tile_returns_immediately() {
        let tile = tile();
        tile.unavailable();
        assert_matches!(tile.wait().await, TileContent::Unavailable);
    }
}
