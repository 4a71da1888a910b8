//! Album cover download for tag embedding.
//!
//! Tracks of one album share a cover URL, so each URL is fetched once per
//! run and the result (including a failure) is cached in memory.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

/// Downloaded cover image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    /// Image data (JPEG or PNG)
    pub data: Vec<u8>,
    /// MIME type as reported by the server
    pub mime_type: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CoverError {
    #[error("cover not found")]
    NotFound,

    #[error("network error: {0}")]
    Network(String),

    #[error("not an image: {0}")]
    NotAnImage(String),
}

/// Cover art client with a per-run cache
pub struct CoverArtClient {
    http_client: reqwest::Client,
    cache: Mutex<HashMap<String, Option<Arc<CoverImage>>>>,
}

impl CoverArtClient {
    pub fn new(timeout: Duration) -> Result<Self, CoverError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoverError::Network(e.to_string()))?;
        Ok(Self::with_http_client(http_client))
    }

    /// Client that talks to local test servers directly.
    #[cfg(test)]
    pub(crate) fn without_proxy() -> Self {
        let http_client = reqwest::Client::builder().no_proxy().build().expect("test HTTP client builds");
        Self::with_http_client(http_client)
    }

    fn with_http_client(http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Cover at `url`, or `None` if it can't be downloaded.
    ///
    /// The cache lock is held across the download so concurrent tracks of
    /// the same album wait for the first request instead of repeating it.
    pub async fn fetch(&self, url: &str) -> Option<Arc<CoverImage>> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.get(url) {
            return cached.clone();
        }

        let fetched = match self.download_image(url).await {
            Ok(image) => {
                tracing::debug!("Fetched cover ({} bytes) from {}", image.data.len(), url);
                Some(Arc::new(image))
            }
            Err(e) => {
                tracing::warn!("Could not fetch cover from {}: {}", url, e);
                None
            }
        };
        cache.insert(url.to_string(), fetched.clone());
        fetched
    }

    async fn download_image(&self, url: &str) -> Result<CoverImage, CoverError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| CoverError::Network(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CoverError::NotFound);
        }

        if !status.is_success() {
            return Err(CoverError::Network(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        if !mime_type.starts_with("image/") {
            return Err(CoverError::NotAnImage(mime_type));
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| CoverError::Network(e.to_string()))?
            .to_vec();
        if data.is_empty() {
            return Err(CoverError::NotAnImage("empty body".to_string()));
        }

        Ok(CoverImage { data, mime_type })
    }
}
