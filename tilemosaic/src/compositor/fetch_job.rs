use std::sync::Arc;

use tilemosaic_types::geo::GeoRegion;
use tokio::sync::mpsc::UnboundedSender;

use super::build_job::{JobId, PlannedFetch};
use super::config::RetryPolicy;
use super::worker::Command;
use crate::decoded_image::DecodedImage;
use crate::error::MosaicError;
use crate::transport::FetchPool;

/// Fetch of one raw tile, shared by all build jobs that need its URL.
///
/// Listeners are attached by the dispatcher worker, and the result comes back to the worker
/// as a [`Command::FetchFinished`], so the listener list is only touched by the worker.
#[derive(Debug)]
pub(crate) struct RawTileFetchJob {
    url: String,
    footprint: GeoRegion,
    row: u32,
    column: u32,
    listeners: Vec<JobId>,
}

impl RawTileFetchJob {
    pub(crate) fn new(planned: PlannedFetch) -> Self {
        Self {
            url: planned.url,
            footprint: planned.footprint,
            row: planned.row,
            column: planned.column,
            listeners: vec![],
        }
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    /// Adds a build job to be notified. Returns false if it was already attached.
    pub(crate) fn attach(&mut self, job: JobId) -> bool {
        if self.listeners.contains(&job) {
            return false;
        }

        self.listeners.push(job);
        true
    }

    pub(crate) fn listeners(&self) -> &[JobId] {
        &self.listeners
    }

    /// Spawns the transfer. The result is sent to the worker when it is done.
    pub(crate) fn start(
        &self,
        pool: FetchPool,
        retry: RetryPolicy,
        commands: UnboundedSender<Command>,
    ) {
        log::trace!(
            "Fetching tile ({}, {}) covering {:?} from {}",
            self.row,
            self.column,
            self.footprint,
            self.url
        );

        let url = self.url.clone();
        tokio::spawn(async move {
            let image = match load_tile(&url, &pool, &retry).await {
                Ok(image) => Some(Arc::new(image)),
                Err(err) => {
                    log::warn!("Failed to load tile {url}: {err}");
                    None
                }
            };

            if commands
                .send(Command::FetchFinished { url, image })
                .is_err()
            {
                log::debug!("Dispatcher stopped before a tile fetch finished");
            }
        });
    }
}

/// Loads and decodes a raw tile, retrying rejected transfers with exponential backoff.
pub(crate) async fn load_tile(
    url: &str,
    pool: &FetchPool,
    retry: &RetryPolicy,
) -> Result<DecodedImage, MosaicError> {
    let mut attempt = 1;
    let bytes = loop {
        match pool.fetch(url).await {
            Err(MosaicError::Rejected) if attempt < retry.max_attempts => {
                let delay = retry.delay(attempt);
                log::debug!("Fetch of {url} rejected, retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(MosaicError::Rejected) => return Err(MosaicError::RetriesExhausted(attempt)),
            result => break result?,
        }
    };

    tokio::task::spawn_blocking(move || DecodedImage::decode(&bytes))
        .await
        .map_err(|err| MosaicError::Generic(format!("tile decoding task failed: {err}")))?
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::tests::{encode_png, solid_rgba, MemorySource};

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 4,
        }
    }

    #[test]
    fn listeners_are_attached_once() {
        let mut fetch = RawTileFetchJob::new(PlannedFetch {
            url: "a".into(),
            footprint: GeoRegion::full_sphere(),
            row: 0,
            column: 0,
        });
        let first = JobId::next();
        let second = JobId::next();

        assert!(fetch.attach(first));
        assert!(fetch.attach(second));
        assert!(!fetch.attach(first));
        assert_eq!(fetch.listeners(), &[first, second]);
        assert_eq!(fetch.url(), "a");
    }

    #[tokio::test]
    async fn retries_rejected_fetch() {
        let source = Arc::new(MemorySource::new());
        source.insert("a", encode_png(&solid_rgba(2, 2, [1, 2, 3, 255])));
        source.reject_first(2);
        let pool = FetchPool::new(source.clone(), 1, 0);

        let image = load_tile("a", &pool, &fast_retry(3)).await.unwrap();
        assert_eq!(image.pixel(1, 1), Some([1, 2, 3, 255]));
        assert_eq!(source.loads("a"), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let source = Arc::new(MemorySource::new());
        source.insert("a", encode_png(&solid_rgba(2, 2, [1, 2, 3, 255])));
        source.reject_first(10);
        let pool = FetchPool::new(source.clone(), 1, 0);

        assert_matches!(
            load_tile("a", &pool, &fast_retry(3)).await,
            Err(MosaicError::RetriesExhausted(3))
        );
        assert_eq!(source.loads("a"), 3);
    }

    #[tokio::test]
    async fn failures_are_not_retried() {
        let source = Arc::new(MemorySource::new());
        source.insert("broken", b"not an image".to_vec());
        let pool = FetchPool::new(source.clone(), 1, 0);

        assert_matches!(
            load_tile("missing", &pool, &fast_retry(3)).await,
            Err(MosaicError::HttpStatus(404))
        );
        assert_matches!(
            load_tile("broken", &pool, &fast_retry(3)).await,
            Err(MosaicError::ImageDecode(_))
        );
        assert_eq!(source.loads("missing"), 1);
    }
}
