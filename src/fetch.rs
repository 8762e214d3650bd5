//! HTTP fetching seam for the download tasks.

use async_trait::async_trait;

use crate::error::{HarvestError, Result};

/// Fetches a full response body for an image URL.
///
/// The trait exists so the download pipeline can be exercised without a
/// network; the production implementation is [`HttpFetcher`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// reqwest-backed fetcher.
///
/// Full-resolution captures can be very large and the archive servers can
/// be very slow, so the client is built with no request timeout and the
/// whole body is read without a size cap.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("mars-harvester/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HarvestError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let wrap = |source| HarvestError::Fetch {
            url: url.to_string(),
            source,
        };
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(wrap)?;
        let body = response.bytes().await.map_err(wrap)?;
        Ok(body.to_vec())
    }
}
