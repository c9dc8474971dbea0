use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;

use super::ByteSource;
use crate::error::MosaicError;

/// Loads raw tiles with HTTP GET requests.
///
/// `429 Too Many Requests` and `503 Service Unavailable` answers are reported as
/// [`MosaicError::Rejected`], so the fetch job retries them with a backoff like a saturated
/// fetch pool. Other non-success statuses are failures.
#[derive(Debug, Clone)]
pub struct HttpByteSource {
    http_client: reqwest::Client,
}

impl HttpByteSource {
    /// Creates a new source.
    pub fn new(
        user_agent: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, MosaicError> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;

        Ok(Self { http_client })
    }
}

#[async_trait]
impl ByteSource for HttpByteSource {
    async fn load_bytes(&self, url: &str) -> Result<Bytes, MosaicError> {
        log::debug!("Loading {url}");

        let response = self.http_client.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            log::info!("Server is busy loading {url}: {status}");
            return Err(MosaicError::Rejected);
        }

        if !status.is_success() {
            log::info!("Failed to load {url}: {status}");
            return Err(MosaicError::HttpStatus(status.as_u16()));
        }

        Ok(response.bytes().await?)
    }
}
