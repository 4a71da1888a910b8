//! Track identity resolution from Spotify references.
//!
//! Turns a user-supplied Spotify URL, URI or bare ID into the ordered list of
//! [`TrackRef`]s that make up the batch. No audio is touched here and no
//! retries are performed; a failure at this stage aborts the run.
//!
//! # Architecture
//!
//! Same split as every external integration in this crate:
//! - **Reference parsing** (this file) - pure, no network
//! - **DTOs** (`spotify/dto.rs`) - exact Web API response shapes
//! - **Adapter** (`spotify/adapter.rs`) - converts DTOs to `TrackRef`
//! - **Client** (`spotify/client.rs`) - HTTP, auth, paging
//!
//! Tag embedding for finished files lives in [`tags`], cover downloads in
//! [`cover`].

pub mod cover;
pub mod spotify;
pub mod tags;

use std::fmt;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::model::TrackRef;

pub use spotify::SpotifyClient;

/// What kind of catalog object a reference points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpotifyKind {
    Track,
    Album,
    Playlist,
}

impl SpotifyKind {
    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "track" => Some(Self::Track),
            "album" => Some(Self::Album),
            "playlist" => Some(Self::Playlist),
            _ => None,
        }
    }
}

impl fmt::Display for SpotifyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Track => "track",
            Self::Album => "album",
            Self::Playlist => "playlist",
        })
    }
}

/// A parsed Spotify reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifyRef {
    pub kind: SpotifyKind,
    pub id: String,
}

impl fmt::Display for SpotifyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "spotify:{}:{}", self.kind, self.id)
    }
}

/// Source of track identity.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Resolve a reference into tracks, in catalog order.
    async fn resolve(&self, reference: &SpotifyRef) -> Result<Vec<TrackRef>>;
}

/// Length of a Spotify base-62 ID
const SPOTIFY_ID_LEN: usize = 22;

fn is_spotify_id(s: &str) -> bool {
    s.len() == SPOTIFY_ID_LEN && s.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Parse a Spotify URL, URI or bare ID.
///
/// Accepted forms:
/// - `https://open.spotify.com/track/<id>?si=...`
/// - `https://open.spotify.com/intl-de/album/<id>`
/// - `spotify:playlist:<id>`
/// - `<id>` (treated as a track)
pub fn parse_reference(input: &str) -> Result<SpotifyRef> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::invalid_reference("empty reference"));
    }

    if is_spotify_id(input) {
        return Ok(SpotifyRef {
            kind: SpotifyKind::Track,
            id: input.to_string(),
        });
    }

    if let Some(rest) = input.strip_prefix("spotify:") {
        let mut parts = rest.split(':');
        let kind = parts.next().and_then(SpotifyKind::from_segment);
        let id = parts.next();
        return match (kind, id, parts.next()) {
            (Some(kind), Some(id), None) if is_spotify_id(id) => Ok(SpotifyRef {
                kind,
                id: id.to_string(),
            }),
            _ => Err(Error::invalid_reference(input)),
        };
    }

    let with_scheme = if input.starts_with("http://") || input.starts_with("https://") {
        input.to_string()
    } else {
        format!("https://{}", input)
    };

    let url = reqwest::Url::parse(&with_scheme).map_err(|_| Error::invalid_reference(input))?;
    if url.host_str() != Some("open.spotify.com") {
        return Err(Error::invalid_reference(format!("not a Spotify link: {}", input)));
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    // Localised links carry an "intl-xx" segment before the kind
    let segments = match segments.first() {
        Some(first) if first.starts_with("intl-") => &segments[1..],
        _ => &segments[..],
    };

    match segments {
        [kind, id, ..] => {
            let kind = SpotifyKind::from_segment(kind)
                .ok_or_else(|| Error::invalid_reference(format!("unsupported link type: {}", input)))?;
            if !is_spotify_id(id) {
                return Err(Error::invalid_reference(format!("malformed ID in {}", input)));
            }
            Ok(SpotifyRef {
                kind,
                id: id.to_string(),
            })
        }
        _ => Err(Error::invalid_reference(input)),
    }
}

/// Parse and resolve in one step.
pub async fn resolve(source: &dyn MetadataSource, input: &str) -> Result<Vec<TrackRef>> {
    let reference = parse_reference(input)?;
    tracing::info!("Resolving {}", reference);
    let tracks = source.resolve(&reference).await?;
    tracing::info!("Resolved {} track(s) from {}", tracks.len(), reference);
    Ok(tracks)
}
