//! Per-track fallback across services.
//!
//! Walks the configured service list in order until one adapter delivers a
//! valid FLAC file:
//!
//! - `NotFound`, `RateLimited`, `Corrupt` move on to the next service
//! - `EndpointDown` on the primary endpoint promotes the session to the
//!   backup endpoint and retries the same service once
//! - `Timeout` retries the same service; enough consecutive timeouts are
//!   treated like `EndpointDown`
//!
//! Attempts for one track are strictly sequential. Promotion is shared by
//! every track in the session.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::endpoint::EndpointState;
use super::{AttemptError, persist};
use crate::metadata::cover::CoverArtClient;
use crate::metadata::tags;
use crate::model::{AttemptOutcome, DownloadAttempt, EndpointMode, FailureKind, TrackRef};
use crate::services::ServiceAdapter;

/// How a track ended after walking the service list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    Done(AttemptOutcome),
    /// Stopped by cancellation; the track stays pending
    Cancelled,
}

/// Outcome plus every attempt made for the track.
#[derive(Debug, Clone)]
pub struct TrackResult {
    pub outcome: TrackOutcome,
    pub attempts: Vec<DownloadAttempt>,
}

impl TrackResult {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, TrackOutcome::Done(AttemptOutcome::Success(_)))
    }
}

/// Fallback coordinator shared by all tracks of a session
pub struct FallbackCoordinator {
    adapters: Vec<Arc<dyn ServiceAdapter>>,
    endpoint: Arc<EndpointState>,
    timeout_promotion_after: u32,
    embed_tags: bool,
    covers: Option<Arc<CoverArtClient>>,
    cancel: CancellationToken,
}

impl FallbackCoordinator {
    pub fn new(adapters: Vec<Arc<dyn ServiceAdapter>>, endpoint: Arc<EndpointState>, cancel: CancellationToken) -> Self {
        Self {
            adapters,
            endpoint,
            timeout_promotion_after: 2,
            embed_tags: false,
            covers: None,
            cancel,
        }
    }

    /// Consecutive timeouts on one service that count as an endpoint failure
    pub fn with_timeout_promotion_after(mut self, count: u32) -> Self {
        self.timeout_promotion_after = count.max(1);
        self
    }

    /// Write Spotify metadata into each file before it is moved into place
    pub fn with_tags(mut self, embed: bool) -> Self {
        self.embed_tags = embed;
        self
    }

    /// Embed the album cover along with the tags
    pub fn with_covers(mut self, covers: Arc<CoverArtClient>) -> Self {
        self.covers = Some(covers);
        self
    }

    pub fn endpoint(&self) -> &EndpointState {
        &self.endpoint
    }

    /// Download one track to `dest`, falling back across services.
    pub async fn run_track(&self, track: &TrackRef, dest: &Path) -> TrackResult {
        let mut attempts = Vec::new();
        let mut last_kind = FailureKind::NotFound;

        for adapter in &self.adapters {
            let service = adapter.service();
            let mut consecutive_timeouts = 0u32;
            let mut retried_on_backup = false;

            loop {
                if self.cancel.is_cancelled() {
                    return TrackResult {
                        outcome: TrackOutcome::Cancelled,
                        attempts,
                    };
                }

                let endpoint = self.endpoint.current();
                let result = self.attempt(adapter.as_ref(), track, endpoint, dest).await;

                let kind = match result {
                    Ok(path) => {
                        tracing::info!(service = %service, endpoint = %endpoint, "Downloaded '{}'", track);
                        attempts.push(DownloadAttempt {
                            track_id: track.spotify_id.clone(),
                            service,
                            endpoint,
                            outcome: AttemptOutcome::Success(path.clone()),
                        });
                        return TrackResult {
                            outcome: TrackOutcome::Done(AttemptOutcome::Success(path)),
                            attempts,
                        };
                    }
                    Err(AttemptError::Cancelled) => {
                        return TrackResult {
                            outcome: TrackOutcome::Cancelled,
                            attempts,
                        };
                    }
                    Err(AttemptError::Failed(kind)) => kind,
                };

                tracing::debug!(service = %service, endpoint = %endpoint, "Attempt for '{}' failed: {}", track, kind);
                attempts.push(DownloadAttempt {
                    track_id: track.spotify_id.clone(),
                    service,
                    endpoint,
                    outcome: AttemptOutcome::Failed(kind),
                });
                last_kind = kind;

                let endpoint_failure = match kind {
                    FailureKind::NotFound | FailureKind::RateLimited | FailureKind::Corrupt => break,
                    FailureKind::EndpointDown => true,
                    FailureKind::Timeout => {
                        consecutive_timeouts += 1;
                        consecutive_timeouts >= self.timeout_promotion_after
                    }
                };

                if !endpoint_failure {
                    // Isolated timeout: same service, same endpoint
                    continue;
                }

                if endpoint == EndpointMode::Primary && self.endpoint.fallback_enabled() && !retried_on_backup {
                    // Another track may have promoted first; either way the retry goes to backup
                    self.endpoint.promote_from(endpoint);
                    retried_on_backup = true;
                    consecutive_timeouts = 0;
                    continue;
                }

                break;
            }
        }

        tracing::warn!("All services failed for '{}' (last: {})", track, last_kind);
        TrackResult {
            outcome: TrackOutcome::Done(AttemptOutcome::Failed(last_kind)),
            attempts,
        }
    }

    /// One adapter invocation including persistence.
    async fn attempt(
        &self,
        adapter: &dyn ServiceAdapter,
        track: &TrackRef,
        endpoint: EndpointMode,
        dest: &Path,
    ) -> Result<PathBuf, AttemptError> {
        let handle = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(AttemptError::Cancelled),
            fetched = adapter.fetch(track, endpoint) => fetched?,
        };

        let (part, written) = persist::write_part(handle, dest, &self.cancel).await?;
        tracing::debug!("Received {} bytes for '{}'", written, track);

        if self.embed_tags {
            let cover = match (&self.covers, &track.cover_url) {
                (Some(covers), Some(url)) => covers.fetch(url).await,
                _ => None,
            };
            let path = part.clone();
            let identity = track.clone();
            match tokio::task::spawn_blocking(move || tags::embed(&path, &identity, cover.as_deref())).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!("Could not tag '{}': {:#}", track, e),
                Err(e) => tracing::warn!("Tagging task for '{}' failed: {}", track, e),
            }
        }

        persist::commit(&part, dest).await?;
        Ok(dest.to_path_buf())
    }
}
