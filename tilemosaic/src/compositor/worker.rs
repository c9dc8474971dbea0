use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ahash::RandomState;
use tokio::sync::mpsc::{UnboundedReceiver, WeakUnboundedSender};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use super::build_job::{CompositeTileBuildJob, JobId};
use super::config::{DispatcherConfig, RetryPolicy};
use super::fetch_job::RawTileFetchJob;
use super::scratch::ScratchCanvas;
use super::{DispatcherStats, Shared};
use crate::decoded_image::DecodedImage;
use crate::error::MosaicError;
use crate::lod::LevelSetConfig;
use crate::transport::FetchPool;

/// Work items of the dispatcher queue.
pub(crate) enum Command {
    /// Start a new build job.
    Build(Box<CompositeTileBuildJob>),
    /// A raw tile fetch is done. `image` is `None` if the tile failed.
    FetchFinished {
        url: String,
        image: Option<Arc<DecodedImage>>,
    },
    /// Deadline of a build job has passed.
    Deadline(JobId),
    /// Report the state of the dispatcher.
    Stats(oneshot::Sender<DispatcherStats>),
}

/// The serialized queue of a dispatcher.
///
/// All state transitions of build jobs, the pending fetch table, the listener lists of the
/// fetches and the scratch canvas belong to the worker task, which processes one command at a
/// time.
pub(crate) struct Worker {
    shared: Arc<Shared>,
    commands: UnboundedReceiver<Command>,
    sender: WeakUnboundedSender<Command>,
    pool: FetchPool,
    retry: RetryPolicy,
    level_set: LevelSetConfig,
    build_deadline: Option<Duration>,
    max_mosaic_dimension: u32,
    jobs: HashMap<JobId, CompositeTileBuildJob, RandomState>,
    fetches: HashMap<String, RawTileFetchJob, RandomState>,
    canvas: ScratchCanvas,
}

impl Worker {
    pub(crate) fn new(
        shared: Arc<Shared>,
        commands: UnboundedReceiver<Command>,
        sender: WeakUnboundedSender<Command>,
        pool: FetchPool,
        config: &DispatcherConfig,
    ) -> Result<Self, MosaicError> {
        Ok(Self {
            shared,
            commands,
            sender,
            pool,
            retry: config.retry,
            level_set: config.level_set()?,
            build_deadline: config.build_deadline(),
            max_mosaic_dimension: config.max_mosaic_dimension,
            jobs: HashMap::default(),
            fetches: HashMap::default(),
            canvas: ScratchCanvas::new(),
        })
    }

    pub(crate) async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            self.handle(command);
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Build(job) => self.start_job(*job),
            Command::FetchFinished { url, image } => self.finish_fetch(&url, image),
            Command::Deadline(id) => self.expire_job(id),
            Command::Stats(reply) => {
                // The requester may have given up waiting.
                let _ = reply.send(self.stats());
            }
        }
    }

    fn start_job(&mut self, mut job: CompositeTileBuildJob) {
        let Some(commands) = self.sender.upgrade() else {
            self.abandon(job, MosaicError::DispatcherStopped);
            return;
        };

        let planned = match job
            .select_matrix(&self.level_set)
            .and_then(|_| job.plan_tiles(self.max_mosaic_dimension))
        {
            Ok(planned) => planned,
            Err(err) => {
                self.abandon(job, err);
                return;
            }
        };

        let id = job.id();
        log::debug!(
            "Job {id:?}: waiting for {} tiles of {:?}",
            planned.len(),
            job.key().region()
        );

        for planned in planned {
            if let Some(fetch) = self.fetches.get_mut(&planned.url) {
                log::trace!("Job {id:?}: joining pending fetch of {}", planned.url);
                fetch.attach(id);
                continue;
            }

            let mut fetch = RawTileFetchJob::new(planned);
            fetch.attach(id);
            fetch.start(self.pool.clone(), self.retry, commands.clone());
            self.fetches.insert(fetch.url().to_string(), fetch);
        }

        if let Some(deadline) = self.build_deadline {
            job.set_deadline(self.schedule_deadline(id, deadline));
        }

        self.jobs.insert(id, job);
    }

    fn schedule_deadline(&self, id: JobId, deadline: Duration) -> AbortHandle {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            if let Some(sender) = sender.upgrade() {
                let _ = sender.send(Command::Deadline(id));
            }
        })
        .abort_handle()
    }

    fn finish_fetch(&mut self, url: &str, image: Option<Arc<DecodedImage>>) {
        let Some(fetch) = self.fetches.remove(url) else {
            log::warn!("Received result of unknown fetch {url}");
            return;
        };

        for id in fetch.listeners() {
            let ready = match self.jobs.get_mut(id) {
                Some(job) => job.tile_complete(url, image.clone()),
                None => {
                    log::trace!("Job {id:?} finished before {url} arrived");
                    false
                }
            };

            if ready {
                self.stitch(*id);
            }
        }
    }

    fn expire_job(&mut self, id: JobId) {
        if self.jobs.get_mut(&id).is_some_and(|job| job.expire()) {
            self.stitch(id);
        }
    }

    fn stitch(&mut self, id: JobId) {
        let Some(mut job) = self.jobs.remove(&id) else {
            return;
        };

        match job.stitch(&mut self.canvas) {
            Some(image) => {
                log::debug!(
                    "Job {id:?}: composed from {} tiles",
                    job.completed_tiles()
                );
                self.shared.publish(job.key(), Some(Arc::new(image)));
            }
            None => {
                log::warn!("Job {id:?}: tile {:?} cannot be composed", job.key().region());
                self.shared.publish(job.key(), None);
            }
        }
    }

    fn abandon(&self, mut job: CompositeTileBuildJob, error: MosaicError) {
        log::warn!(
            "Tile {:?} at level {} is unavailable ({:?}): {error}",
            job.key().region(),
            job.key().level(),
            job.state()
        );

        job.fail();
        self.shared.publish(job.key(), None);
    }

    fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            pending_build_jobs: self.shared.pending_build_jobs(),
            active_build_jobs: self.jobs.len(),
            pending_fetches: self.fetches.len(),
            queued_fetches: self.pool.waiting(),
            fetches_issued: self.pool.issued(),
            scratch_capacity: self.canvas.capacity(),
        }
    }
}

impl Drop for Worker {
    /// Resolves everything the worker can no longer serve: jobs in progress, build requests
    /// still in the queue and keys waiting in the pending table. Runs when the worker stops,
    /// including when its task panics or is cancelled with the runtime.
    fn drop(&mut self) {
        self.commands.close();

        for (_, job) in std::mem::take(&mut self.jobs) {
            self.abandon(job, MosaicError::DispatcherStopped);
        }

        while let Ok(command) = self.commands.try_recv() {
            if let Command::Build(job) = command {
                self.abandon(*job, MosaicError::DispatcherStopped);
            }
        }

        let orphaned = self.shared.fail_all();
        if orphaned > 0 {
            log::warn!("Dispatcher worker stopped with {orphaned} unresolved tile requests");
        }

        log::debug!("Dispatcher worker stopped");
    }
}
