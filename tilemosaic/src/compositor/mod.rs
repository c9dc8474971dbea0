//! Composition of output tiles from the raw tiles of a WMTS layer.
//!
//! A [`Dispatcher`] accepts [`TileRequest`]s and delivers composed images to
//! [`TileDestination`]s. Requests with equal [`BuildJobKey`]s are served by one build job, and
//! every raw tile URL is fetched at most once at a time, however many build jobs need it.
//!
//! Build jobs go through these states, all of them driven by the single worker task of the
//! dispatcher:
//!
//! 1. the tile matrix matching the requested level is selected;
//! 2. the raw tiles overlapping the requested region are located and their fetches are started
//!    or joined;
//! 3. when all fetches have reported (or the build deadline has passed), the raw tiles are
//!    stitched, the requested region is cut out and scaled to the output size.
//!
//! Failed raw tiles leave transparent gaps in the output. A job that cannot produce an image
//! at all marks its destinations as unavailable.

use std::collections::HashMap;
use std::sync::Arc;

use ahash::RandomState;
use parking_lot::Mutex;
use tilemosaic_types::cartesian::Size;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::oneshot;

mod build_job;
mod builder;
mod config;
mod fetch_job;
mod grid;
mod request;
mod scratch;
mod worker;

pub use builder::DispatcherBuilder;
pub use config::{DispatcherConfig, RetryPolicy};
pub use request::{BuildJobKey, TileRequest};

use self::build_job::CompositeTileBuildJob;
use self::worker::{Command, Worker};
use crate::decoded_image::DecodedImage;
use crate::error::MosaicError;
use crate::messenger::Messenger;
use crate::tile::{ImageTile, TileDestination};
use crate::transport::FetchPool;

/// Outcome of [`Dispatcher::submit_build_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// A new build job was created for the request.
    Created,
    /// A build job with the same key is in progress; the destination will get its result.
    Coalesced,
    /// The dispatcher is stopped. The destination was marked unavailable.
    Stopped,
}

/// Snapshot of the dispatcher state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Build keys waiting for a result.
    pub pending_build_jobs: usize,
    /// Build jobs waiting for raw tiles.
    pub active_build_jobs: usize,
    /// Raw tile fetches in progress.
    pub pending_fetches: usize,
    /// Fetches waiting for a free transfer slot.
    pub queued_fetches: usize,
    /// Transfers started since the dispatcher was created.
    pub fetches_issued: u64,
    /// Size of the scratch canvas.
    pub scratch_capacity: Size<u32>,
}

type DestinationTable = HashMap<BuildJobKey, Vec<Arc<dyn TileDestination>>, RandomState>;

pub(crate) struct Shared {
    pending: Mutex<DestinationTable>,
    messenger: Option<Box<dyn Messenger>>,
}

impl Shared {
    fn new(messenger: Option<Box<dyn Messenger>>) -> Self {
        Self {
            pending: Mutex::new(HashMap::default()),
            messenger,
        }
    }

    pub(crate) fn pending_build_jobs(&self) -> usize {
        self.pending.lock().len()
    }

    /// Marks every waiting destination as unavailable. Returns the number of keys dropped.
    pub(crate) fn fail_all(&self) -> usize {
        let pending = std::mem::take(&mut *self.pending.lock());
        let count = pending.len();

        for destination in pending.into_values().flatten() {
            destination.unavailable();
        }

        count
    }

    /// Delivers the result of a build job to all destinations waiting for its key.
    pub(crate) fn publish(&self, key: &BuildJobKey, image: Option<Arc<DecodedImage>>) {
        let destinations = self.pending.lock().remove(key).unwrap_or_default();

        match image {
            Some(image) => {
                for destination in &destinations {
                    destination.publish(image.clone());
                }

                if let Some(messenger) = &self.messenger {
                    messenger.request_redraw();
                }
            }
            None => {
                for destination in &destinations {
                    destination.unavailable();
                }
            }
        }
    }
}

/// Composes output tiles from raw WMTS tiles.
///
/// A dispatcher is created with a [`DispatcherBuilder`] inside a tokio runtime. It is a cheap
/// handle: clones share the same worker, tables and fetch pool. The worker stops when all
/// handles are dropped and the pending fetches are done. Requests still waiting
/// at that point are marked unavailable.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
    commands: UnboundedSender<Command>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pending_build_jobs", &self.pending_build_jobs())
            .field("stopped", &self.commands.is_closed())
            .finish()
    }
}

impl Dispatcher {
    pub(crate) fn start(
        runtime: &Handle,
        pool: FetchPool,
        config: &DispatcherConfig,
        messenger: Option<Box<dyn Messenger>>,
    ) -> Result<Self, MosaicError> {
        let (commands, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::new(messenger));
        let worker = Worker::new(
            shared.clone(),
            receiver,
            commands.downgrade(),
            pool,
            config,
        )?;

        runtime.spawn(worker.run());

        Ok(Self { shared, commands })
    }

    /// Requests an output tile. The result is delivered to the destination.
    ///
    /// If a request with the same [`BuildJobKey`] is in progress, no new work is started and
    /// the destination receives the result of the running job.
    pub fn submit_build_request(
        &self,
        request: TileRequest,
        destination: Arc<dyn TileDestination>,
    ) -> Submission {
        let key = request.key();

        {
            let mut pending = self.shared.pending.lock();
            if let Some(destinations) = pending.get_mut(&key) {
                log::trace!("Joining pending build of {:?}", key.region());
                destinations.push(destination);
                return Submission::Coalesced;
            }

            pending.insert(key.clone(), vec![destination]);
        }

        let job = CompositeTileBuildJob::new(request);
        if self.commands.send(Command::Build(Box::new(job))).is_err() {
            log::error!("Dispatcher worker is not running, tile {:?} is unavailable", key.region());
            self.shared.publish(&key, None);
            return Submission::Stopped;
        }

        Submission::Created
    }

    /// Requests an output tile and returns the tile object that will receive it.
    pub fn request_tile(&self, request: TileRequest, row: u32, column: u32) -> Arc<ImageTile> {
        let tile = Arc::new(ImageTile::new(request.region, request.level, row, column));
        self.submit_build_request(request, tile.clone());
        tile
    }

    /// Number of build keys waiting for a result.
    pub fn pending_build_jobs(&self) -> usize {
        self.shared.pending_build_jobs()
    }

    /// State of the dispatcher, as seen by the worker after it has processed all previously
    /// submitted requests. Returns `None` if the worker is stopped.
    pub async fn stats(&self) -> Option<DispatcherStats> {
        let (reply, response) = oneshot::channel();
        self.commands.send(Command::Stats(reply)).ok()?;
        response.await.ok()
    }
}
