//! Notifications about published tiles.

/// Receives notifications from the dispatcher when new tiles become available, so that the
/// consumer can redraw its view.
pub trait Messenger: Send + Sync {
    /// Called every time a composed tile is published to its destinations.
    fn request_redraw(&self);
}
