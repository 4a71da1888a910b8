//! Batch retry loop.
//!
//! Runs the fallback coordinator over every pending track in rounds. A round
//! is a barrier: it ends only when every track in it has finished. Between
//! rounds the loop pauses for the backoff interval, clipped to whatever is
//! left of the time budget. A budget of zero means exactly one round.
//!
//! Succeeded tracks never re-enter `pending`, so a finished file is never
//! downloaded twice.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use rayon::prelude::*;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::coordinator::{FallbackCoordinator, TrackOutcome};
use super::{DownloadJob, persist};
use crate::model::{AttemptOutcome, DownloadAttempt, FailureKind};

/// Progress of a batch across rounds
#[derive(Debug, Default)]
pub struct BatchState {
    pub pending: Vec<DownloadJob>,
    pub succeeded: Vec<DownloadJob>,
    /// Already on disk before the first round
    pub skipped: Vec<DownloadJob>,
    /// Most recent failure per pending Spotify ID
    pub last_failure: HashMap<String, FailureKind>,
    pub attempts: Vec<DownloadAttempt>,
    pub rounds: u32,
    pub deadline: Option<Instant>,
    pub cancelled: bool,
}

impl BatchState {
    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    /// Attempts made for one track across all rounds
    pub fn attempts_for(&self, spotify_id: &str) -> usize {
        self.attempts.iter().filter(|a| a.track_id == spotify_id).count()
    }
}

/// Partition jobs into (already on disk, still to download).
///
/// The existence checks open files, so they run on the blocking pool. If that
/// task dies, every job is treated as missing and downloaded again.
async fn split_present(jobs: Vec<DownloadJob>) -> (Vec<DownloadJob>, Vec<DownloadJob>) {
    let dests: Vec<_> = jobs.iter().map(|job| job.dest.clone()).collect();
    let count = dests.len();
    let present = tokio::task::spawn_blocking(move || {
        dests.par_iter().map(|dest| persist::is_present(dest)).collect::<Vec<_>>()
    })
    .await
    .unwrap_or_else(|e| {
        tracing::warn!("Existing-file check failed, downloading everything: {}", e);
        vec![false; count]
    });

    let (skipped, pending): (Vec<_>, Vec<_>) = jobs.into_iter().zip(present).partition(|(_, present)| *present);
    (
        skipped.into_iter().map(|(job, _)| job).collect(),
        pending.into_iter().map(|(job, _)| job).collect(),
    )
}

/// Retry loop controller
pub struct RetryLoopController {
    coordinator: Arc<FallbackCoordinator>,
    budget: Duration,
    backoff: Duration,
    workers: usize,
    cancel: CancellationToken,
}

impl RetryLoopController {
    /// `budget_minutes` of zero runs a single round.
    pub fn new(coordinator: Arc<FallbackCoordinator>, budget_minutes: u64, cancel: CancellationToken) -> Self {
        Self {
            coordinator,
            budget: Duration::from_secs(budget_minutes.saturating_mul(60)),
            backoff: Duration::from_secs(30),
            workers: 3,
            cancel,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Run rounds until nothing is pending, time is up, or the run is cancelled.
    pub async fn run(&self, jobs: Vec<DownloadJob>) -> BatchState {
        let start = Instant::now();
        let deadline = (!self.budget.is_zero()).then(|| start + self.budget);

        let (skipped, pending) = split_present(jobs).await;
        for job in &skipped {
            tracing::info!("Already downloaded, skipping '{}'", job.track);
        }

        let mut state = BatchState {
            pending,
            skipped,
            deadline,
            ..Default::default()
        };

        loop {
            if state.pending.is_empty() {
                break;
            }
            if self.cancel.is_cancelled() {
                state.cancelled = true;
                break;
            }

            state.rounds += 1;
            self.run_round(&mut state).await;

            if state.pending.is_empty() || state.cancelled {
                break;
            }
            let Some(deadline) = deadline else {
                break;
            };

            let now = Instant::now();
            if now >= deadline {
                tracing::info!("Time budget spent with {} track(s) pending", state.pending.len());
                break;
            }

            let pause = self.backoff.min(deadline - now);
            tracing::info!(
                round = state.rounds,
                pending = state.pending.len(),
                "Retrying in {}s",
                pause.as_secs()
            );
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    state.cancelled = true;
                    break;
                }
                _ = tokio::time::sleep(pause) => {}
            }

            if Instant::now() >= deadline {
                tracing::info!("Time budget spent with {} track(s) pending", state.pending.len());
                break;
            }
        }

        state.pending.sort_by_key(|job| job.index);
        state.succeeded.sort_by_key(|job| job.index);
        state
    }

    async fn run_round(&self, state: &mut BatchState) {
        let jobs = std::mem::take(&mut state.pending);
        tracing::info!(round = state.rounds, tracks = jobs.len(), "Starting round");

        let coordinator = &self.coordinator;
        let results: Vec<_> = stream::iter(jobs)
            .map(|job| async move {
                let result = coordinator.run_track(&job.track, &job.dest).await;
                (job, result)
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        for (job, result) in results {
            state.attempts.extend(result.attempts);
            match result.outcome {
                TrackOutcome::Done(AttemptOutcome::Success(_)) => {
                    state.last_failure.remove(&job.track.spotify_id);
                    state.succeeded.push(job);
                }
                TrackOutcome::Done(AttemptOutcome::Failed(kind)) => {
                    state.last_failure.insert(job.track.spotify_id.clone(), kind);
                    state.pending.push(job);
                }
                TrackOutcome::Cancelled => {
                    state.cancelled = true;
                    state.pending.push(job);
                }
            }
        }
    }
}
