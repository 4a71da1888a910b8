//! Core data models shared by every stage of a download run.
//!
//! Defines the primary entities: [`TrackRef`], [`ServiceCandidate`],
//! [`EndpointMode`] and the per-attempt bookkeeping types.
//!
//! # Lifecycle
//!
//! - `TrackRef` is produced once by the metadata resolver and never mutated
//! - `ServiceCandidate` lists are fixed at session start
//! - `DownloadAttempt` records are ephemeral, one per adapter invocation

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Identity of a single track as resolved from the Spotify catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackRef {
    /// Spotify base-62 track ID
    pub spotify_id: String,
    /// Track title
    pub title: String,
    /// Credited artists in catalog order (most tracks have one or two)
    pub artists: SmallVec<[String; 2]>,
    /// Album title
    pub album: String,
    /// Position on the disc (1-based, 0 when unknown)
    pub track_number: u32,
    /// Disc number (1-based, 0 when unknown)
    pub disc_number: u32,
    /// Duration in milliseconds
    pub duration_ms: u64,
    /// International Standard Recording Code, when the catalog exposes one
    pub isrc: Option<String>,
    /// Album release date as the catalog reports it (`YYYY`, `YYYY-MM` or `YYYY-MM-DD`)
    pub release_date: Option<String>,
    /// Largest album cover image
    pub cover_url: Option<String>,
}

impl TrackRef {
    /// All artists joined the way filenames and tags display them.
    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }

    /// First credited artist, used for artist folders.
    pub fn primary_artist(&self) -> &str {
        self.artists.first().map(String::as_str).unwrap_or("")
    }

    /// Four-digit release year, when the date has one.
    ///
    /// The catalog reports `0000` for releases with an unknown date.
    pub fn release_year(&self) -> Option<u32> {
        let year = self.release_date.as_deref()?.get(..4)?;
        if !year.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        year.parse().ok().filter(|&y| y > 0)
    }

    /// Public Spotify URL for this track.
    pub fn spotify_url(&self) -> String {
        format!("https://open.spotify.com/track/{}", self.spotify_id)
    }
}

impl fmt::Display for TrackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.title, self.artist_line())
    }
}

/// A streaming catalog reachable through the retrieval service.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ServiceCandidate {
    Tidal,
    Amazon,
    Qobuz,
    Deezer,
}

impl ServiceCandidate {
    /// Identifier used on the wire and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tidal => "tidal",
            Self::Amazon => "amazon",
            Self::Qobuz => "qobuz",
            Self::Deezer => "deezer",
        }
    }

    /// Human-readable name for summaries.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Tidal => "Tidal",
            Self::Amazon => "Amazon Music",
            Self::Qobuz => "Qobuz",
            Self::Deezer => "Deezer",
        }
    }
}

impl fmt::Display for ServiceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceCandidate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tidal" => Ok(Self::Tidal),
            "amazon" => Ok(Self::Amazon),
            "qobuz" => Ok(Self::Qobuz),
            "deezer" => Ok(Self::Deezer),
            other => Err(format!("unknown service '{}'", other)),
        }
    }
}

/// Deduplicate a service preference list, keeping first occurrences.
///
/// An empty list falls back to `[Tidal]`.
pub fn dedup_services(services: &[ServiceCandidate]) -> Vec<ServiceCandidate> {
    let mut ordered = Vec::with_capacity(services.len());
    for service in services {
        if !ordered.contains(service) {
            ordered.push(*service);
        }
    }
    if ordered.is_empty() {
        ordered.push(ServiceCandidate::Tidal);
    }
    ordered
}

/// Which address of the retrieval service a call goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EndpointMode {
    #[default]
    Primary,
    Backup,
}

impl fmt::Display for EndpointMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Backup => f.write_str("backup"),
        }
    }
}

/// Recoverable failure reported by a service adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
pub enum FailureKind {
    #[error("no matching track in catalog")]
    NotFound,

    #[error("rate limited by service")]
    RateLimited,

    #[error("retrieval endpoint unreachable")]
    EndpointDown,

    #[error("request timed out")]
    Timeout,

    #[error("received corrupt or non-FLAC data")]
    Corrupt,
}

/// Result of one adapter invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(PathBuf),
    Failed(FailureKind),
}

/// Bookkeeping record for a single adapter invocation.
#[derive(Debug, Clone)]
pub struct DownloadAttempt {
    pub track_id: String,
    pub service: ServiceCandidate,
    pub endpoint: EndpointMode,
    pub outcome: AttemptOutcome,
}
