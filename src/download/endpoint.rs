//! Session-wide endpoint mode.
//!
//! Starts on the primary address and may be promoted to the backup exactly
//! once per run. Every in-flight track reads the same state, so a promotion
//! triggered by one track is seen by the next attempt of every other.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;

use crate::model::EndpointMode;

/// Shared endpoint mode with one-way promotion
#[derive(Debug)]
pub struct EndpointState {
    mode: RwLock<EndpointMode>,
    fallback_enabled: bool,
    promotions: AtomicU32,
}

impl EndpointState {
    pub fn new(fallback_enabled: bool) -> Self {
        Self {
            mode: RwLock::new(EndpointMode::Primary),
            fallback_enabled,
            promotions: AtomicU32::new(0),
        }
    }

    /// Mode the next attempt should use.
    pub fn current(&self) -> EndpointMode {
        *self.mode.read()
    }

    pub fn fallback_enabled(&self) -> bool {
        self.fallback_enabled
    }

    /// Promote to Backup if the caller's attempt ran on Primary.
    ///
    /// Returns `true` only for the single caller that performed the
    /// transition. Callers that lost the race, or whose attempt already ran
    /// on Backup, get `false`; the mode never reverts.
    pub fn promote_from(&self, observed: EndpointMode) -> bool {
        if !self.fallback_enabled || observed != EndpointMode::Primary {
            return false;
        }

        let mut mode = self.mode.write();
        if *mode != EndpointMode::Primary {
            return false;
        }
        *mode = EndpointMode::Backup;
        self.promotions.fetch_add(1, Ordering::Relaxed);
        tracing::warn!("Primary endpoint unavailable, switching to backup for the rest of the run");
        true
    }

    /// How many times promotion happened (0 or 1).
    pub fn promotions(&self) -> u32 {
        self.promotions.load(Ordering::Relaxed)
    }
}
