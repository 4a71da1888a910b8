//! Spotify Web API Data Transfer Objects
//!
//! These types match what the Web API returns.
//! DO NOT use these types outside the spotify module - convert to `TrackRef`.
//!
//! Only the fields we consume are declared; serde ignores the rest.

use serde::{Deserialize, Serialize};

/// Client-credentials token response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime in seconds
    pub expires_in: u64,
}

/// Full track object (`/v1/tracks/{id}` and playlist items)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Track {
    /// Null for local files in playlists
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    pub album: Option<AlbumRef>,
    #[serde(default)]
    pub track_number: u32,
    #[serde(default)]
    pub disc_number: u32,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub external_ids: Option<ExternalIds>,
    #[serde(default)]
    pub is_local: bool,
    /// "track" or "episode"
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Simplified track object (album track listing)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimplifiedTrack {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub track_number: u32,
    #[serde(default)]
    pub disc_number: u32,
    #[serde(default)]
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtistRef {
    pub name: String,
}

/// Album fields shared by track objects and the album endpoint
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AlbumRef {
    pub name: String,
    /// "2024", "2024-08" or "2024-08-16" depending on `release_date_precision`
    #[serde(default)]
    pub release_date: Option<String>,
    /// Cover art in several sizes, widest first
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Image {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExternalIds {
    pub isrc: Option<String>,
}

/// Album object (`/v1/albums/{id}`)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Album {
    pub id: String,
    #[serde(flatten)]
    pub info: AlbumRef,
    pub tracks: Paging<SimplifiedTrack>,
}

/// Playlist track item (`/v1/playlists/{id}/tracks`)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaylistItem {
    /// Null when the track was removed from the catalog
    pub track: Option<Track>,
}

/// Paging envelope
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Paging<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    /// Absolute URL of the next page
    pub next: Option<String>,
    #[serde(default)]
    pub total: u32,
}

/// Error envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub status: u16,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_track() {
        let json = r#"{
            "id": "2plbrEY59IikOBgBGLjaoe",
            "name": "Die With A Smile",
            "artists": [{"name": "Lady Gaga", "id": "x"}, {"name": "Bruno Mars"}],
            "album": {
                "name": "Die With A Smile",
                "album_type": "single",
                "release_date": "2024-08-16",
                "images": [{"url": "https://i.scdn.co/image/640", "width": 640, "height": 640}]
            },
            "track_number": 1,
            "disc_number": 1,
            "duration_ms": 251667,
            "external_ids": {"isrc": "USUM72409273"},
            "is_local": false,
            "type": "track",
            "popularity": 99
        }"#;
        let track: Track = serde_json::from_str(json).unwrap();
        assert_eq!(track.artists.len(), 2);
        assert_eq!(track.external_ids.unwrap().isrc.as_deref(), Some("USUM72409273"));
        let album = track.album.unwrap();
        assert_eq!(album.release_date.as_deref(), Some("2024-08-16"));
        assert_eq!(album.images[0].width, Some(640));
    }

    #[test]
    fn test_parse_album_flattens_shared_fields() {
        let json = r#"{
            "id": "1",
            "name": "Record",
            "release_date": "1999",
            "images": [],
            "tracks": {"items": [], "next": null, "total": 0}
        }"#;
        let album: Album = serde_json::from_str(json).unwrap();
        assert_eq!(album.info.name, "Record");
        assert_eq!(album.info.release_date.as_deref(), Some("1999"));
    }

    #[test]
    fn test_parse_playlist_page_with_null_track() {
        let json = r#"{
            "items": [{"track": null}, {"track": {"id": null, "name": "Local", "is_local": true}}],
            "next": "https://api.spotify.com/v1/playlists/x/tracks?offset=100",
            "total": 150
        }"#;
        let page: Paging<PlaylistItem> = serde_json::from_str(json).unwrap();
        assert!(page.items[0].track.is_none());
        assert!(page.items[1].track.as_ref().unwrap().is_local);
        assert!(page.next.is_some());
    }

    #[test]
    fn test_parse_error() {
        let json = r#"{"error": {"status": 404, "message": "Non existing id"}}"#;
        let err: ApiError = serde_json::from_str(json).unwrap();
        assert_eq!(err.error.status, 404);
    }
}
