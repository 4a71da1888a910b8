//! Trait definitions at the adapter and transport seams.
//!
//! These traits enable dependency injection and mocking for tests.
//! Production code uses [`super::CatalogAdapter`] over
//! [`super::lucida::LucidaClient`], while tests substitute scripted mocks.
//!
//! # Example
//!
//! ```ignore
//! use spotiflac::services::traits::ServiceAdapter;
//!
//! // In production code:
//! async fn try_one(adapter: &dyn ServiceAdapter, track: &TrackRef) {
//!     let handle = adapter.fetch(track, EndpointMode::Primary).await?;
//! }
//!
//! // In tests:
//! let adapter = MockAdapter::new(ServiceCandidate::Tidal).then_fail(FailureKind::NotFound);
//! ```

use async_trait::async_trait;

use super::{CatalogEntry, SearchQuery, StreamHandle};
use crate::model::{EndpointMode, FailureKind, ServiceCandidate, TrackRef};

/// One streaming backend.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    /// Backend this adapter talks to.
    fn service(&self) -> ServiceCandidate;

    /// Find the track in this backend and open its FLAC stream.
    async fn fetch(&self, track: &TrackRef, endpoint: EndpointMode) -> Result<StreamHandle, FailureKind>;
}

/// The intermediary retrieval service.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait RetrievalTransport: Send + Sync {
    /// Look the track up in one backend catalog.
    async fn search(&self, endpoint: EndpointMode, query: &SearchQuery) -> Result<Vec<CatalogEntry>, FailureKind>;

    /// Prepare and open the stream for a chosen entry.
    async fn open(&self, endpoint: EndpointMode, entry: &CatalogEntry) -> Result<StreamHandle, FailureKind>;
}
