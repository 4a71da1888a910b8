//! Candidate scoring.
//!
//! Catalog entries are compared with the Spotify track by normalized title
//! and artist similarity. An ISRC match wins outright. Among candidates that
//! clear the threshold the highest score wins, ties going to the better
//! quality rank.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use super::CatalogEntry;
use crate::model::TrackRef;

/// Title carries more weight than artist credits, which vary between catalogs
const TITLE_WEIGHT: f32 = 0.65;
const ARTIST_WEIGHT: f32 = 1.0 - TITLE_WEIGHT;

/// Floor for a title whose words are all contained in the other
const CONTAINMENT_SCORE: f32 = 0.8;

fn decoration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // "(feat. X)", "[Remastered 2011]", "- 2009 Remaster", "- Radio Edit" and friends
        Regex::new(
            r"(?i)\s*[\(\[](?:feat\.?|ft\.?|featuring|with)\s[^\)\]]*[\)\]]|\s*[\(\[][^\)\]]*(?:remaster|version|edit|mono|stereo)[^\)\]]*[\)\]]|\s+-\s+[^-]*(?:remaster|version|edit|mono|stereo)[^-]*$",
        )
        .expect("decoration pattern is valid")
    })
}

/// Lowercase, strip featuring credits and remaster tags, drop punctuation.
pub fn normalize(s: &str) -> String {
    let stripped = decoration_re().replace_all(s, "");
    stripped
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity of two already-normalized strings, 0.0 - 1.0.
pub fn similarity(a: &str, b: &str) -> f32 {
    if a == b {
        return 1.0;
    }
    let a: HashSet<&str> = a.split_whitespace().collect();
    let b: HashSet<&str> = b.split_whitespace().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let shared = a.intersection(&b).count() as f32;
    let jaccard = shared / a.union(&b).count() as f32;

    if a.is_subset(&b) || b.is_subset(&a) {
        jaccard.max(CONTAINMENT_SCORE)
    } else {
        jaccard
    }
}

/// Best artist similarity: any credited artist on either side may match.
fn artist_similarity(track: &TrackRef, entry: &CatalogEntry) -> f32 {
    let joined = normalize(&entry.artists.join(" "));
    track
        .artists
        .iter()
        .map(|a| normalize(a))
        .flat_map(|ours| {
            entry
                .artists
                .iter()
                .map(|theirs| similarity(&ours, &normalize(theirs)))
                .chain(std::iter::once(similarity(&ours, &joined)))
                .collect::<Vec<_>>()
        })
        .fold(0.0, f32::max)
}

/// Score one candidate against the track.
///
/// Entries without a reported title were mapped by the intermediary from
/// the Spotify ID itself and score exactly `threshold`.
pub fn score(track: &TrackRef, entry: &CatalogEntry, threshold: f32) -> f32 {
    if let (Some(ours), Some(theirs)) = (&track.isrc, &entry.isrc)
        && ours.eq_ignore_ascii_case(theirs)
    {
        return 1.0;
    }

    let Some(title) = entry.title.as_deref() else {
        return threshold;
    };

    let title_score = similarity(&normalize(&track.title), &normalize(title));
    if entry.artists.is_empty() || track.artists.is_empty() {
        return title_score;
    }

    (TITLE_WEIGHT * title_score + ARTIST_WEIGHT * artist_similarity(track, entry)).min(1.0)
}

/// Closest candidate clearing `threshold`, or `None`.
pub fn pick_best<'a>(track: &TrackRef, candidates: &'a [CatalogEntry], threshold: f32) -> Option<&'a CatalogEntry> {
    candidates
        .iter()
        .map(|c| (score(track, c, threshold), c))
        .filter(|(s, _)| *s >= threshold)
        .max_by(|(sa, a), (sb, b)| {
            sa.partial_cmp(sb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.quality_rank.cmp(&b.quality_rank))
        })
        .map(|(_, c)| c)
}
