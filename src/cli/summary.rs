//! End-of-run report.

use std::fmt::Write;

use crate::download::BatchState;
use crate::verify::{Classification, VerificationVerdict};

/// Human-readable batch summary, one line per track that needs attention.
pub fn render(state: &BatchState, verdicts: &[VerificationVerdict], promoted: bool) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "\nDownloaded {}, already present {}, failed {} ({} attempt(s) over {} round(s))",
        state.succeeded.len(),
        state.skipped.len(),
        state.pending.len(),
        state.attempts.len(),
        state.rounds
    );

    for job in &state.pending {
        let reason = state
            .last_failure
            .get(&job.track.spotify_id)
            .map(|kind| kind.to_string())
            .unwrap_or_else(|| "not attempted".to_string());
        let _ = writeln!(
            out,
            "  FAILED  {} ({}, {} attempt(s))",
            job.track,
            reason,
            state.attempts_for(&job.track.spotify_id)
        );
    }

    if promoted {
        let _ = writeln!(out, "Primary endpoint failed; switched to backup");
    }
    if state.cancelled {
        let _ = writeln!(out, "Interrupted; {} track(s) left pending", state.pending.len());
    }

    if !verdicts.is_empty() {
        let count = |c: Classification| verdicts.iter().filter(|v| v.classification == c).count();
        let _ = writeln!(
            out,
            "Verified: {} lossless, {} upsampled, {} inconclusive",
            count(Classification::Lossless),
            count(Classification::Upsampled),
            count(Classification::Inconclusive)
        );

        for verdict in verdicts.iter().filter(|v| v.classification == Classification::Upsampled) {
            let name = state
                .succeeded
                .iter()
                .find(|job| job.track.spotify_id == verdict.track_id)
                .map(|job| job.track.to_string())
                .unwrap_or_else(|| verdict.track_id.clone());
            let _ = writeln!(
                out,
                "  UPSAMPLED  {} (cutoff {:.1} kHz)",
                name,
                verdict.evidence.cutoff_hz / 1000.0
            );
        }
    }

    out
}
