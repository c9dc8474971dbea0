//! Transfer of raw tile bytes: the [`ByteSource`] seam and the bounded pool the fetch jobs
//! go through.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Semaphore, TryAcquireError};

use crate::error::MosaicError;

mod http;

pub use http::HttpByteSource;

/// Source of raw tile bytes identified by URL.
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Loads the bytes of the resource.
    ///
    /// [`MosaicError::Rejected`] signals a transient overload of the source; the request is
    /// retried later. Any other error is a failure of the tile.
    async fn load_bytes(&self, url: &str) -> Result<Bytes, MosaicError>;
}

/// Bounded pool of concurrent transfers.
///
/// At most `max_concurrent` transfers run at the same time. Further fetches wait in the pool
/// until a transfer finishes, but no more than `max_queued` of them. A fetch that finds the
/// queue full is rejected with [`MosaicError::Rejected`].
#[derive(Clone)]
pub(crate) struct FetchPool {
    source: Arc<dyn ByteSource>,
    permits: Arc<Semaphore>,
    waiting: Arc<AtomicUsize>,
    max_queued: usize,
    issued: Arc<AtomicU64>,
}

struct QueueSlot<'a>(&'a AtomicUsize);

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl FetchPool {
    pub(crate) fn new(source: Arc<dyn ByteSource>, max_concurrent: usize, max_queued: usize) -> Self {
        Self {
            source,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            waiting: Arc::new(AtomicUsize::new(0)),
            max_queued,
            issued: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Loads the bytes through the pool.
    pub(crate) async fn fetch(&self, url: &str) -> Result<Bytes, MosaicError> {
        let _permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => {
                let _slot = self.enter_queue().ok_or(MosaicError::Rejected)?;
                self.permits
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| MosaicError::Generic("fetch pool is closed".into()))?
            }
            Err(TryAcquireError::Closed) => {
                return Err(MosaicError::Generic("fetch pool is closed".into()))
            }
        };

        self.issued.fetch_add(1, Ordering::Relaxed);
        self.source.load_bytes(url).await
    }

    fn enter_queue(&self) -> Option<QueueSlot<'_>> {
        self.waiting
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |waiting| {
                (waiting < self.max_queued).then_some(waiting + 1)
            })
            .ok()?;

        Some(QueueSlot(&self.waiting))
    }

    /// Number of transfers started through the pool.
    pub(crate) fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    /// Number of fetches waiting for a free transfer slot.
    pub(crate) fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }
}
