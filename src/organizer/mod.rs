//! Destination layout for downloaded tracks.
//!
//! Derives the relative path of each FLAC file from track identity and the
//! user's formatting choices, e.g. `{Artist}/{Album}/{TrackNum} - {Title} - {Artist}.flac`.
//!
//! Planning is pure: no I/O, no hidden state, identical inputs always give
//! identical paths.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::Error;
use crate::model::TrackRef;

/// Extension of every planned file
pub const FLAC_EXTENSION: &str = "flac";

/// How the filename stem is composed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum FilenameFormat {
    /// `Title - Artist`
    #[default]
    TitleArtist,
    /// `Artist - Title`
    ArtistTitle,
    /// `Title`
    TitleOnly,
}

impl FromStr for FilenameFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "title_artist" => Ok(Self::TitleArtist),
            "artist_title" => Ok(Self::ArtistTitle),
            "title_only" => Ok(Self::TitleOnly),
            other => Err(Error::config(format!("unsupported filename format '{}'", other))),
        }
    }
}

impl fmt::Display for FilenameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TitleArtist => "title_artist",
            Self::ArtistTitle => "artist_title",
            Self::TitleOnly => "title_only",
        })
    }
}

/// User-selected layout options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayoutOptions {
    pub format: FilenameFormat,
    pub use_track_number: bool,
    pub use_artist_folder: bool,
    pub use_album_folder: bool,
}

/// Filename stem (no extension, no folders) for a track.
pub fn file_stem(track: &TrackRef, options: &LayoutOptions) -> String {
    let title = match sanitize_filename(&track.title) {
        t if t.is_empty() => "Unknown Track".to_string(),
        t => t,
    };
    let artists = sanitize_filename(&track.artist_line());

    let name = match options.format {
        FilenameFormat::TitleArtist if !artists.is_empty() => format!("{} - {}", title, artists),
        FilenameFormat::ArtistTitle if !artists.is_empty() => format!("{} - {}", artists, title),
        _ => title,
    };

    if options.use_track_number && track.track_number > 0 {
        format!("{:02} - {}", track.track_number, name)
    } else {
        name
    }
}

/// Relative destination path for a track.
pub fn plan_path(track: &TrackRef, options: &LayoutOptions) -> PathBuf {
    let mut path = PathBuf::new();

    if options.use_artist_folder {
        path.push(folder_name(track.primary_artist(), "Unknown Artist"));
    }
    if options.use_album_folder {
        path.push(folder_name(&track.album, "Unknown Album"));
    }

    path.push(format!("{}.{}", file_stem(track, options), FLAC_EXTENSION));
    path
}

fn folder_name(raw: &str, fallback: &str) -> String {
    let name = sanitize_filename(raw);
    // "." and ".." would escape the output directory
    if name.is_empty() || name.chars().all(|c| c == '.') {
        fallback.to_string()
    } else {
        name
    }
}

/// Sanitizes a filename component.
///
/// Double quotes become single quotes, other characters that are invalid on
/// common filesystems become `_`, whitespace runs collapse to one space.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '"' => '\'',
            '/' | '\\' | ':' | '*' | '?' | '<' | '>' | '|' => '_',
            c if c.is_control() => ' ',
            _ => c,
        })
        .collect();

    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}
