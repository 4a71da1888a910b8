//! Tag embedding for finished downloads.
//!
//! Uses the lofty crate for format-independent metadata access. Files are
//! tagged while still under their temporary name, so the format is detected
//! from content rather than extension.

use std::path::Path;

use anyhow::{Context, Result};
use lofty::config::WriteOptions;
use lofty::file::TaggedFileExt;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag, TagExt};

use super::cover::CoverImage;
use crate::model::TrackRef;

/// Write the track's Spotify identity, and the album cover when given, into
/// the file's tags.
///
/// Returns the number of fields written.
pub fn embed(path: &Path, track: &TrackRef, cover: Option<&CoverImage>) -> Result<usize> {
    let mut tagged_file = Probe::open(path)
        .context("Failed to open file for tagging")?
        .guess_file_type()
        .context("Failed to detect file type")?
        .read()
        .context("Failed to read file for tag writing")?;

    let tag_type = tagged_file.primary_tag_type();
    if tagged_file.tag(tag_type).is_none() {
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    let tag = tagged_file
        .tag_mut(tag_type)
        .context("Tag missing after insertion")?;

    let mut fields = 0;

    if !track.title.is_empty() {
        tag.set_title(track.title.clone());
        fields += 1;
    }
    if !track.artists.is_empty() {
        tag.set_artist(track.artist_line());
        fields += 1;
    }
    if !track.album.is_empty() {
        tag.set_album(track.album.clone());
        fields += 1;
    }
    if track.track_number > 0 {
        tag.set_track(track.track_number);
        fields += 1;
    }
    if track.disc_number > 0 {
        tag.set_disk(track.disc_number);
        fields += 1;
    }
    if let Some(ref isrc) = track.isrc {
        tag.insert_text(ItemKey::Isrc, isrc.clone());
        fields += 1;
    }
    if let Some(ref date) = track.release_date {
        tag.insert_text(ItemKey::RecordingDate, date.clone());
        fields += 1;
    }
    if let Some(year) = track.release_year() {
        tag.insert_text(ItemKey::Year, year.to_string());
        fields += 1;
    }
    if let Some(cover) = cover {
        tag.remove_picture_type(PictureType::CoverFront);
        tag.push_picture(Picture::new_unchecked(
            PictureType::CoverFront,
            Some(MimeType::from_str(&cover.mime_type)),
            None,
            cover.data.clone(),
        ));
        fields += 1;
    }

    tag.save_to_path(path, WriteOptions::default())
        .context("Failed to write tags to file")?;

    tracing::debug!("Wrote {} tag field(s) to {:?}", fields, path);
    Ok(fields)
}
