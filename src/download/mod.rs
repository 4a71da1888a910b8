//! Download pipeline: fallback across services, atomic persistence and the
//! batch retry loop.
//!
//! # Architecture
//!
//! - [`endpoint`] - session-wide primary/backup state
//! - [`persist`] - `.part` file writing, validation and commit
//! - [`coordinator`] - per-track walk through the service list
//! - [`retry`] - rounds over all pending tracks until done or out of time

pub mod coordinator;
pub mod endpoint;
pub mod persist;
pub mod retry;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::model::{FailureKind, TrackRef};
use crate::organizer::{self, LayoutOptions};

pub use coordinator::{FallbackCoordinator, TrackOutcome, TrackResult};
pub use endpoint::EndpointState;
pub use retry::{BatchState, RetryLoopController};

/// A track paired with where it must end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    /// Position in the resolved batch
    pub index: usize,
    pub track: TrackRef,
    /// Absolute destination path
    pub dest: PathBuf,
}

/// Why a single attempt did not produce a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptError {
    Failed(FailureKind),
    Cancelled,
}

impl From<FailureKind> for AttemptError {
    fn from(kind: FailureKind) -> Self {
        Self::Failed(kind)
    }
}

/// Plan a destination for every track under `output_dir`.
///
/// Distinct tracks that would collide on the same path get a ` (2)`, ` (3)`
/// ... suffix. Paths are compared case-insensitively, since macOS and Windows
/// filesystems treat `Intro.flac` and `intro.flac` as one file. The same
/// Spotify track listed twice is only downloaded once.
pub fn plan_jobs(tracks: &[TrackRef], output_dir: &Path, layout: &LayoutOptions) -> Vec<DownloadJob> {
    let mut taken: HashMap<String, String> = HashMap::new();
    let mut jobs = Vec::with_capacity(tracks.len());

    for (index, track) in tracks.iter().enumerate() {
        let planned = organizer::plan_path(track, layout);

        let mut candidate = planned.clone();
        let mut n = 2;
        loop {
            match taken.get(&collision_key(&candidate)) {
                None => break,
                Some(id) if *id == track.spotify_id => break,
                Some(_) => {
                    candidate = with_suffix(&planned, n);
                    n += 1;
                }
            }
        }

        let key = collision_key(&candidate);
        if taken.get(&key).is_some_and(|id| *id == track.spotify_id) {
            tracing::info!("Skipping duplicate entry for '{}'", track);
            continue;
        }

        taken.insert(key, track.spotify_id.clone());
        jobs.push(DownloadJob {
            index,
            track: track.clone(),
            dest: output_dir.join(candidate),
        });
    }

    jobs
}

fn collision_key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

fn with_suffix(path: &Path, n: usize) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let name = format!("{} ({}).{}", stem, n, organizer::FLAC_EXTENSION);
    path.with_file_name(name)
}
