use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("image download failed: {0}")]
pub struct DownloadError(#[from] reqwest::Error);

/// Fetches the raw bytes behind a source image URL. A collaborator
/// contract: the orchestrator never talks to the network for images
/// directly.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn download(&self, url: &str) -> Result<Vec<u8>, DownloadError>;
}

#[derive(Debug, Clone, Default)]
pub struct HttpImageFetcher {
    http: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn download(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}
