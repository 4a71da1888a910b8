//! Streaming-service adapters.
//!
//! One [`CatalogAdapter`] per backend (Tidal, Amazon Music, Qobuz, Deezer).
//! Given a track, an adapter asks the retrieval transport for candidates in
//! that backend's catalog, picks the closest match, and opens a byte stream.
//!
//! Adapters hold no state between calls. Everything backend-specific about
//! talking to the intermediary lives behind [`RetrievalTransport`]; see
//! [`lucida`] for the production implementation.

pub mod lucida;
pub mod matching;
pub mod traits;

use std::sync::Arc;

use async_trait::async_trait;

use crate::model::{EndpointMode, FailureKind, ServiceCandidate, TrackRef};

pub use traits::{RetrievalTransport, ServiceAdapter};

/// Source of FLAC bytes for one download.
#[async_trait]
pub trait ChunkSource: Send {
    /// Next chunk, or `None` once the stream is exhausted.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, FailureKind>;
}

/// A fetchable stream returned by a successful adapter call.
pub struct StreamHandle {
    pub service: ServiceCandidate,
    /// Content length announced by the server, when known
    pub expected_len: Option<u64>,
    pub source: Box<dyn ChunkSource>,
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("service", &self.service)
            .field("expected_len", &self.expected_len)
            .finish_non_exhaustive()
    }
}

/// In-memory chunk source
#[cfg(test)]
pub struct MemoryStream {
    chunks: std::collections::VecDeque<Result<Vec<u8>, FailureKind>>,
}

#[cfg(test)]
impl MemoryStream {
    pub fn new(chunks: impl IntoIterator<Item = Result<Vec<u8>, FailureKind>>) -> Self {
        Self {
            chunks: chunks.into_iter().collect(),
        }
    }

    /// Whole payload as a single chunk
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::new([Ok(bytes)])
    }
}

#[cfg(test)]
#[async_trait]
impl ChunkSource for MemoryStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, FailureKind> {
        self.chunks.pop_front().transpose()
    }
}

/// What an adapter asks the transport to look up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub service: ServiceCandidate,
    pub spotify_id: String,
    pub spotify_url: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub isrc: Option<String>,
}

impl SearchQuery {
    pub fn for_track(service: ServiceCandidate, track: &TrackRef) -> Self {
        Self {
            service,
            spotify_id: track.spotify_id.clone(),
            spotify_url: track.spotify_url(),
            title: track.title.clone(),
            artist: track.artist_line(),
            album: track.album.clone(),
            isrc: track.isrc.clone(),
        }
    }
}

/// Access grant the intermediary hands out with a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub primary: String,
    pub expiry: Option<u64>,
}

/// One candidate in a backend catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub service: ServiceCandidate,
    /// Locator the transport understands (the backend's track URL)
    pub locator: String,
    /// Display title, when the intermediary reports one
    pub title: Option<String>,
    pub artists: Vec<String>,
    pub isrc: Option<String>,
    /// Higher is better (hi-res > CD quality)
    pub quality_rank: u8,
    pub access: Option<AccessToken>,
}

/// Adapter for one backend catalog.
pub struct CatalogAdapter {
    service: ServiceCandidate,
    transport: Arc<dyn RetrievalTransport>,
    threshold: f32,
}

impl CatalogAdapter {
    pub fn new(service: ServiceCandidate, transport: Arc<dyn RetrievalTransport>, threshold: f32) -> Self {
        Self {
            service,
            transport,
            threshold,
        }
    }
}

#[async_trait]
impl ServiceAdapter for CatalogAdapter {
    fn service(&self) -> ServiceCandidate {
        self.service
    }

    async fn fetch(&self, track: &TrackRef, endpoint: EndpointMode) -> Result<StreamHandle, FailureKind> {
        let query = SearchQuery::for_track(self.service, track);
        let candidates = self.transport.search(endpoint, &query).await?;

        let Some(best) = matching::pick_best(track, &candidates, self.threshold) else {
            tracing::debug!(
                service = %self.service,
                candidates = candidates.len(),
                "No candidate for '{}' cleared the similarity threshold",
                track
            );
            return Err(FailureKind::NotFound);
        };

        tracing::debug!(service = %self.service, locator = %best.locator, "Matched '{}'", track);
        self.transport.open(endpoint, best).await
    }
}

/// One adapter per service, in preference order, all sharing a transport.
pub fn build_adapters(
    services: &[ServiceCandidate],
    transport: Arc<dyn RetrievalTransport>,
    threshold: f32,
) -> Vec<Arc<dyn ServiceAdapter>> {
    services
        .iter()
        .map(|&service| {
            Arc::new(CatalogAdapter::new(service, Arc::clone(&transport), threshold)) as Arc<dyn ServiceAdapter>
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::traits::mocks::MockTransport;
    use super::*;
    use crate::test_utils::{fake_flac_bytes, mock_track};

    fn entry(title: &str, artist: &str) -> CatalogEntry {
        CatalogEntry {
            service: ServiceCandidate::Tidal,
            locator: format!("https://tidal.com/browse/track/{}", title.len()),
            title: Some(title.to_string()),
            artists: vec![artist.to_string()],
            isrc: None,
            quality_rank: 0,
            access: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_opens_best_match() {
        let transport = Arc::new(MockTransport::new().with_search(Ok(vec![
            entry("Completely Different", "Someone"),
            entry("Song", "Artist"),
        ])));
        let adapter = CatalogAdapter::new(ServiceCandidate::Tidal, transport.clone(), 0.6);

        let handle = adapter
            .fetch(&mock_track("Song", &["Artist"]), EndpointMode::Primary)
            .await
            .unwrap();
        assert_eq!(handle.service, ServiceCandidate::Tidal);

        let opened = transport.opened();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].title.as_deref(), Some("Song"));
    }

    #[tokio::test]
    async fn test_fetch_below_threshold_is_not_found() {
        let transport = Arc::new(MockTransport::new().with_search(Ok(vec![entry("Other", "Someone")])));
        let adapter = CatalogAdapter::new(ServiceCandidate::Qobuz, transport.clone(), 0.6);

        let result = adapter.fetch(&mock_track("Song", &["Artist"]), EndpointMode::Primary).await;
        assert_eq!(result.unwrap_err(), FailureKind::NotFound);
        assert!(transport.opened().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_propagates_transport_failure() {
        let transport = Arc::new(MockTransport::new().with_search(Err(FailureKind::EndpointDown)));
        let adapter = CatalogAdapter::new(ServiceCandidate::Deezer, transport.clone(), 0.6);

        let result = adapter.fetch(&mock_track("Song", &["Artist"]), EndpointMode::Backup).await;
        assert_eq!(result.unwrap_err(), FailureKind::EndpointDown);
        assert_eq!(transport.searched_endpoints(), vec![EndpointMode::Backup]);
    }

    #[tokio::test]
    async fn test_memory_stream_yields_then_ends() {
        let mut stream = MemoryStream::new([Ok(fake_flac_bytes(4)), Ok(vec![1, 2])]);
        assert_eq!(stream.next_chunk().await.unwrap().unwrap().len(), 8);
        assert_eq!(stream.next_chunk().await.unwrap().unwrap(), vec![1, 2]);
        assert!(stream.next_chunk().await.unwrap().is_none());
    }

    #[test]
    fn test_build_adapters_keeps_order() {
        use ServiceCandidate::*;
        let transport: Arc<dyn RetrievalTransport> = Arc::new(MockTransport::new());
        let adapters = build_adapters(&[Qobuz, Tidal], transport, 0.6);
        let services: Vec<_> = adapters.iter().map(|a| a.service()).collect();
        assert_eq!(services, vec![Qobuz, Tidal]);
    }
}
