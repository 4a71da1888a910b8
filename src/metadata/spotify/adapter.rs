//! Adapter layer: Convert Spotify DTOs to `TrackRef`
//!
//! This is the ONLY place where Spotify DTO types become domain types.

use smallvec::SmallVec;

use super::dto;
use crate::model::TrackRef;

fn artist_names(artists: &[dto::ArtistRef]) -> SmallVec<[String; 2]> {
    artists
        .iter()
        .map(|a| a.name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// URL of the widest image. Spotify lists them widest first, but doesn't promise to.
fn largest_image(images: &[dto::Image]) -> Option<String> {
    images
        .iter()
        .max_by_key(|img| img.width.unwrap_or(0) * img.height.unwrap_or(1))
        .map(|img| img.url.clone())
}

fn release_date(album: &dto::AlbumRef) -> Option<String> {
    album
        .release_date
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

/// Convert a full track object.
///
/// Returns `None` for items that cannot be downloaded: local files,
/// podcast episodes, and tracks without an ID.
pub fn to_track_ref(track: dto::Track) -> Option<TrackRef> {
    if track.is_local || track.kind.as_deref().is_some_and(|k| k != "track") {
        return None;
    }
    let spotify_id = track.id?;
    let album = track.album.unwrap_or_default();

    Some(TrackRef {
        spotify_id,
        title: track.name,
        artists: artist_names(&track.artists),
        release_date: release_date(&album),
        cover_url: largest_image(&album.images),
        album: album.name,
        track_number: track.track_number,
        disc_number: track.disc_number,
        duration_ms: track.duration_ms,
        isrc: track
            .external_ids
            .and_then(|ids| ids.isrc)
            .map(|isrc| isrc.trim().to_uppercase())
            .filter(|isrc| !isrc.is_empty()),
    })
}

/// Convert an album track listing entry. Album fields come from the parent.
pub fn simplified_to_track_ref(track: dto::SimplifiedTrack, album: &dto::AlbumRef) -> Option<TrackRef> {
    let spotify_id = track.id?;

    Some(TrackRef {
        spotify_id,
        title: track.name,
        artists: artist_names(&track.artists),
        album: album.name.clone(),
        track_number: track.track_number,
        disc_number: track.disc_number,
        duration_ms: track.duration_ms,
        isrc: None,
        release_date: release_date(album),
        cover_url: largest_image(&album.images),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(url: &str, size: u32) -> dto::Image {
        dto::Image {
            url: url.to_string(),
            width: Some(size),
            height: Some(size),
        }
    }

    fn dto_track() -> dto::Track {
        dto::Track {
            id: Some("2plbrEY59IikOBgBGLjaoe".to_string()),
            name: "Die With A Smile".to_string(),
            artists: vec![
                dto::ArtistRef { name: "Lady Gaga".to_string() },
                dto::ArtistRef { name: "Bruno Mars".to_string() },
            ],
            album: Some(dto::AlbumRef {
                name: "Single".to_string(),
                release_date: Some("2024-08-16".to_string()),
                images: vec![
                    image("https://i.scdn.co/image/300", 300),
                    image("https://i.scdn.co/image/640", 640),
                    image("https://i.scdn.co/image/64", 64),
                ],
            }),
            track_number: 1,
            disc_number: 1,
            duration_ms: 251_667,
            external_ids: Some(dto::ExternalIds { isrc: Some("usum72409273".to_string()) }),
            is_local: false,
            kind: Some("track".to_string()),
        }
    }

    #[test]
    fn test_to_track_ref() {
        let track = to_track_ref(dto_track()).unwrap();
        assert_eq!(track.artist_line(), "Lady Gaga, Bruno Mars");
        assert_eq!(track.album, "Single");
        assert_eq!(track.isrc.as_deref(), Some("USUM72409273"));
        assert_eq!(track.release_date.as_deref(), Some("2024-08-16"));
        assert_eq!(track.cover_url.as_deref(), Some("https://i.scdn.co/image/640"));
    }

    #[test]
    fn test_track_without_album_has_no_cover_or_date() {
        let mut dto = dto_track();
        dto.album = None;
        let track = to_track_ref(dto).unwrap();
        assert!(track.album.is_empty());
        assert!(track.cover_url.is_none());
        assert!(track.release_date.is_none());
    }

    #[test]
    fn test_local_and_episode_items_are_skipped() {
        let mut local = dto_track();
        local.is_local = true;
        assert!(to_track_ref(local).is_none());

        let mut episode = dto_track();
        episode.kind = Some("episode".to_string());
        assert!(to_track_ref(episode).is_none());

        let mut no_id = dto_track();
        no_id.id = None;
        assert!(to_track_ref(no_id).is_none());
    }

    #[test]
    fn test_simplified_takes_album_from_parent() {
        let simplified = dto::SimplifiedTrack {
            id: Some("id".to_string()),
            name: "Intro".to_string(),
            artists: vec![dto::ArtistRef { name: "Band".to_string() }],
            track_number: 1,
            disc_number: 2,
            duration_ms: 1000,
        };
        let album = dto::AlbumRef {
            name: "Record".to_string(),
            release_date: Some(" ".to_string()),
            images: vec![image("https://i.scdn.co/image/cover", 640)],
        };
        let track = simplified_to_track_ref(simplified, &album).unwrap();
        assert_eq!(track.album, "Record");
        assert_eq!(track.disc_number, 2);
        assert_eq!(track.cover_url.as_deref(), Some("https://i.scdn.co/image/cover"));
        assert!(track.release_date.is_none());
    }
}
