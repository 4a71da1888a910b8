//! Lossless verification by spectral cutoff.
//!
//! Lossy encoders throw away content above a fixed frequency, typically
//! somewhere between 16 and 20 kHz. When such a file is later wrapped in
//! FLAC, the spectrum still shows the encoder's hard cliff. A genuine
//! lossless master carries content up to near Nyquist instead.
//!
//! The verdict is advisory. It never fails and never changes what happened
//! to the download; undecodable, short or silent files are `Inconclusive`.

mod decoder;
mod spectrum;

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::VerifierConfig;
use crate::error::{Result, ResultExt};

pub use decoder::{DecodeError, MonoDecoder};
pub use spectrum::SpectrumAccumulator;

/// Bands averaged on each side of a candidate cliff
const CLIFF_SPAN: usize = 4;

/// Share of Nyquist above which resampling filters roll off anyway
const NYQUIST_CEILING: f32 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Lossless,
    Upsampled,
    Inconclusive,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Lossless => "lossless",
            Self::Upsampled => "upsampled",
            Self::Inconclusive => "inconclusive",
        };
        f.write_str(s)
    }
}

/// What the classification was based on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Effective bandwidth of the signal
    pub cutoff_hz: f32,
    /// Level drop across the cutoff
    pub cliff_db: f32,
    pub sample_rate: u32,
    /// Non-silent windows that went into the spectrum
    pub analyzed_windows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationVerdict {
    pub track_id: String,
    pub classification: Classification,
    pub evidence: Evidence,
}

impl VerificationVerdict {
    fn inconclusive(track_id: &str, sample_rate: u32) -> Self {
        Self {
            track_id: track_id.to_string(),
            classification: Classification::Inconclusive,
            evidence: Evidence {
                sample_rate,
                ..Default::default()
            },
        }
    }
}

fn classify_spectrum(acc: &SpectrumAccumulator, sample_rate: u32, cfg: &VerifierConfig) -> (Classification, Evidence) {
    let mut evidence = Evidence {
        sample_rate,
        analyzed_windows: acc.windows(),
        ..Default::default()
    };
    if sample_rate == 0 || acc.windows() < cfg.min_windows {
        return (Classification::Inconclusive, evidence);
    }

    let ceiling = sample_rate as f32 / 2.0 * NYQUIST_CEILING;
    let mut levels = acc.band_levels(sample_rate, cfg.band_hz, ceiling);
    if levels.len() < 2 {
        return (Classification::Inconclusive, evidence);
    }

    let reference = levels.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let floor = reference - cfg.floor_db;
    let top_band = levels.iter().rposition(|&l| l > floor).unwrap_or(0);

    // Anything below the floor is treated as silence
    for level in &mut levels {
        *level = level.max(floor);
    }

    let lossless_min = cfg.lossless_min_hz.min(ceiling);
    match find_cliff(&levels, cfg.cliff_db) {
        Some((band, drop)) => {
            evidence.cutoff_hz = band as f32 * cfg.band_hz;
            evidence.cliff_db = drop;
        }
        None => {
            evidence.cutoff_hz = (top_band + 1) as f32 * cfg.band_hz;
        }
    }

    let classification = if evidence.cutoff_hz >= lossless_min {
        Classification::Lossless
    } else if evidence.cliff_db >= cfg.cliff_db && evidence.cutoff_hz >= cfg.lossy_min_hz {
        Classification::Upsampled
    } else {
        // Band-limited master or a smooth roll-off
        Classification::Inconclusive
    };

    (classification, evidence)
}

/// Band index where the steepest qualifying drop begins, with its height.
///
/// A boundary qualifies when every band above it sits at least `min_drop`
/// below the average of the bands just beneath it.
fn find_cliff(levels: &[f32], min_drop: f32) -> Option<(usize, f32)> {
    let mean = |s: &[f32]| s.iter().sum::<f32>() / s.len() as f32;
    let mut best: Option<(usize, f32)> = None;

    for b in 1..levels.len() {
        let below = mean(&levels[b.saturating_sub(CLIFF_SPAN)..b]);
        let above = &levels[b..];
        let highest_above = above.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        if below - highest_above < min_drop {
            continue;
        }

        let drop = below - mean(&above[..CLIFF_SPAN.min(above.len())]);
        if best.is_none_or(|(_, d)| drop > d) {
            best = Some((b, drop));
        }
    }

    best
}

/// Decode and classify one file. Never fails.
pub fn verify_file(path: &Path, track_id: &str, cfg: &VerifierConfig) -> VerificationVerdict {
    let mut decoder = match MonoDecoder::open(path) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!("Cannot verify {:?}: {}", path, e);
            return VerificationVerdict::inconclusive(track_id, 0);
        }
    };

    let sample_rate = decoder.sample_rate();
    let hop = decoder
        .n_frames()
        .map(|n| (n / cfg.max_windows.max(1) as u64) as usize)
        .unwrap_or(0);
    let mut acc = SpectrumAccumulator::new(cfg.fft_size, hop, cfg.max_windows, cfg.silence_rms);

    while !acc.is_full() {
        match decoder.next_block() {
            Ok(Some(block)) => acc.push(&block),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("Stopped decoding {:?} early: {}", path, e);
                break;
            }
        }
    }

    let (classification, evidence) = classify_spectrum(&acc, sample_rate, cfg);
    tracing::debug!(
        cutoff_hz = evidence.cutoff_hz,
        cliff_db = evidence.cliff_db,
        windows = evidence.analyzed_windows,
        "{:?} classified {}",
        path,
        classification
    );

    VerificationVerdict {
        track_id: track_id.to_string(),
        classification,
        evidence,
    }
}

/// Verify many files in parallel, keeping input order.
pub fn verify_all(files: &[(PathBuf, String)], cfg: &VerifierConfig) -> Vec<VerificationVerdict> {
    files
        .par_iter()
        .map(|(path, track_id)| verify_file(path, track_id, cfg))
        .collect()
}

/// Where the verdict for `audio` is stored.
pub fn sidecar_path(audio: &Path) -> PathBuf {
    let mut name = audio.as_os_str().to_owned();
    name.push(".verdict.json");
    PathBuf::from(name)
}

#[derive(Serialize)]
struct SidecarRecord<'a> {
    #[serde(flatten)]
    verdict: &'a VerificationVerdict,
    checked_at: String,
}

/// Write the verdict next to the audio file.
pub fn write_sidecar(audio: &Path, verdict: &VerificationVerdict) -> Result<PathBuf> {
    let record = SidecarRecord {
        verdict,
        checked_at: chrono::Utc::now().to_rfc3339(),
    };
    let json = serde_json::to_vec_pretty(&record).map_err(std::io::Error::other)?;

    let path = sidecar_path(audio);
    std::fs::write(&path, json).with_context(format!("writing {}", path.display()))?;
    Ok(path)
}
