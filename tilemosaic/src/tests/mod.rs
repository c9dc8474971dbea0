//! Fixtures shared by the unit tests of the crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, Rgba, RgbaImage};
use parking_lot::Mutex;
use tilemosaic_types::cartesian::{Point2, Size};
use tilemosaic_types::geo::GeoRegion;
use tokio::sync::Semaphore;

use crate::compositor::TileRequest;
use crate::error::MosaicError;
use crate::messenger::Messenger;
use crate::tile_matrix::{Crs, TileMatrix, TileMatrixSet};
use crate::transport::ByteSource;
use crate::wmts::{UrlTemplate, WmtsLayer};

pub(crate) const TEMPLATE: &str = "https://tiles.test/{Layer}/{TileMatrix}/{TileRow}/{TileCol}.png";

/// In-memory byte source counting the loads of every URL.
///
/// A gated source holds every load until [`MemorySource::open_gate`] is called.
#[derive(Default)]
pub(crate) struct MemorySource {
    tiles: Mutex<HashMap<String, Bytes>>,
    loads: Mutex<HashMap<String, usize>>,
    gate: Option<Arc<Semaphore>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    reject_first: AtomicUsize,
}

impl MemorySource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Default::default()
        }
    }

    pub(crate) fn insert(&self, url: &str, bytes: Vec<u8>) {
        self.tiles.lock().insert(url.to_string(), Bytes::from(bytes));
    }

    pub(crate) fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1024);
        }
    }

    /// Makes the next `count` loads fail with [`MosaicError::Rejected`].
    pub(crate) fn reject_first(&self, count: usize) {
        self.reject_first.store(count, Ordering::SeqCst);
    }

    pub(crate) fn loads(&self, url: &str) -> usize {
        self.loads.lock().get(url).copied().unwrap_or(0)
    }

    pub(crate) fn total_loads(&self) -> usize {
        self.loads.lock().values().sum()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    async fn load_bytes(&self, url: &str) -> Result<Bytes, MosaicError> {
        *self.loads.lock().entry(url.to_string()).or_default() += 1;

        if self
            .reject_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
        {
            return Err(MosaicError::Rejected);
        }

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            // Permits are never taken away, so the gate stays open once opened.
            let _permit = gate.acquire().await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.tiles
            .lock()
            .get(url)
            .cloned()
            .ok_or(MosaicError::HttpStatus(404))
    }
}

#[derive(Default)]
pub(crate) struct CountingMessenger {
    redraws: Arc<AtomicUsize>,
}

impl CountingMessenger {
    pub(crate) fn counter(&self) -> Arc<AtomicUsize> {
        self.redraws.clone()
    }
}

impl Messenger for CountingMessenger {
    fn request_redraw(&self) {
        self.redraws.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) fn solid_rgba(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba(color))
}

pub(crate) fn encode_png(image: &RgbaImage) -> Vec<u8> {
    let mut bytes = vec![];
    PngEncoder::new(&mut bytes)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ColorType::Rgba8,
        )
        .unwrap();
    bytes
}

/// Geographic tile matrix set with `levels` matrices. Matrix `i` has `2^(i+1) x 2^i` tiles.
pub(crate) fn crs84_quad(levels: u32) -> TileMatrixSet {
    let matrices = (0..levels)
        .map(|i| {
            TileMatrix::new(
                i.to_string(),
                279_541_132.014_358_9 / 2f64.powi(i as i32),
                Point2::new(90.0, -180.0),
                Size::new(256, 256),
                Size::new(2u32.pow(i + 1), 2u32.pow(i)),
            )
        })
        .collect();

    TileMatrixSet::new("WorldCRS84Quad", Crs::Epsg4326, matrices)
}

pub(crate) fn request(region: GeoRegion, level: u32) -> TileRequest {
    TileRequest {
        region,
        level,
        layer: Arc::new(WmtsLayer::new("world", None)),
        matrix_set: Arc::new(crs84_quad(3)),
        url_template: UrlTemplate::new(TEMPLATE),
        desired_size: Size::new(256, 256),
    }
}
