use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use super::config::{DispatcherConfig, RetryPolicy};
use super::Dispatcher;
use crate::error::MosaicError;
use crate::messenger::Messenger;
use crate::transport::{ByteSource, FetchPool, HttpByteSource};

/// Constructor for a [`Dispatcher`].
///
/// ```no_run
/// use tilemosaic::DispatcherBuilder;
///
/// # async fn create() -> Result<(), tilemosaic::MosaicError> {
/// let dispatcher = DispatcherBuilder::new_http()
///     .with_max_concurrent_fetches(8)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct DispatcherBuilder {
    source_type: SourceType,
    config: DispatcherConfig,
    messenger: Option<Box<dyn Messenger>>,
}

enum SourceType {
    Http,
    Custom(Arc<dyn ByteSource>),
}

impl DispatcherBuilder {
    /// Initializes a builder for a dispatcher loading raw tiles over HTTP.
    pub fn new_http() -> Self {
        Self {
            source_type: SourceType::Http,
            config: DispatcherConfig::default(),
            messenger: None,
        }
    }

    /// Initializes a builder for a dispatcher loading raw tiles from the given source.
    pub fn new_with_source(source: impl ByteSource + 'static) -> Self {
        Self::new_with_shared_source(Arc::new(source))
    }

    /// Same as [`DispatcherBuilder::new_with_source`], for a source shared with other code.
    pub fn new_with_shared_source(source: Arc<dyn ByteSource>) -> Self {
        Self {
            source_type: SourceType::Custom(source),
            config: DispatcherConfig::default(),
            messenger: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the maximum number of concurrent raw tile transfers.
    pub fn with_max_concurrent_fetches(mut self, max_concurrent_fetches: usize) -> Self {
        self.config.max_concurrent_fetches = max_concurrent_fetches;
        self
    }

    /// Sets the maximum number of fetches waiting for a transfer slot.
    pub fn with_max_queued_fetches(mut self, max_queued_fetches: usize) -> Self {
        self.config.max_queued_fetches = max_queued_fetches;
        self
    }

    /// Sets the retry schedule of rejected fetches.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Sets the time a build job waits for its raw tiles. `None` waits forever.
    pub fn with_build_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.config.build_deadline_ms = deadline.map(|d| d.as_millis() as u64);
        self
    }

    /// Sets the largest width or height (pixels) of a mosaic assembled for one output tile.
    pub fn with_max_mosaic_dimension(mut self, max_mosaic_dimension: u32) -> Self {
        self.config.max_mosaic_dimension = max_mosaic_dimension;
        self
    }

    /// Sets the messenger notified when tiles are published.
    pub fn with_messenger(mut self, messenger: impl Messenger + 'static) -> Self {
        self.messenger = Some(Box::new(messenger));
        self
    }

    /// Consumes the builder and starts the dispatcher.
    ///
    /// # Errors
    ///
    /// Fails if called outside of a tokio runtime, if the configuration is invalid, or if the
    /// HTTP client cannot be created.
    pub fn build(self) -> Result<Dispatcher, MosaicError> {
        let Self {
            source_type,
            config,
            messenger,
        } = self;

        let runtime = Handle::try_current().map_err(|_| {
            MosaicError::Generic("dispatcher must be created inside a tokio runtime".into())
        })?;

        config.validate()?;

        let source: Arc<dyn ByteSource> = match source_type {
            SourceType::Http => Arc::new(HttpByteSource::new(
                &config.user_agent,
                config.connect_timeout(),
                config.request_timeout(),
            )?),
            SourceType::Custom(source) => source,
        };

        let pool = FetchPool::new(
            source,
            config.max_concurrent_fetches,
            config.max_queued_fetches,
        );

        log::debug!(
            "Starting dispatcher with {} concurrent fetches",
            config.max_concurrent_fetches
        );

        Dispatcher::start(&runtime, pool, &config, messenger)
    }
}
