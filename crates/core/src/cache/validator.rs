//! Cache validity decisions.
//!
//! Pure functions: no I/O happens here, callers supply the current
//! fingerprint, the recorded manifest entry and whether the artifact files
//! are still on disk.

use super::fingerprint::{Fingerprint, Mismatch};
use super::manifest::ManifestEntry;
use serde::Serialize;
use std::fmt;

/// Why a recorded artifact can no longer be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "component")]
pub enum StaleReason {
    /// A fingerprint component differs.
    Mismatch(Mismatch),
    /// The manifest names files that are gone.
    ArtifactMissing,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::Mismatch(component) => write!(f, "fingerprint mismatch: {component:?}"),
            StaleReason::ArtifactMissing => f.write_str("artifact missing"),
        }
    }
}

/// Outcome of checking a recorded artifact against current inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Hit,
    Miss,
    Stale(StaleReason),
}

impl Validation {
    /// Only a hit may be served; stale is handled exactly like a miss.
    pub fn is_usable(&self) -> bool {
        matches!(self, Validation::Hit)
    }
}

/// Decide whether the artifact recorded by `entry` may be reused.
pub fn validate(current: &Fingerprint, entry: Option<&ManifestEntry>, artifact_present: bool) -> Validation {
    let Some(entry) = entry else {
        return Validation::Miss;
    };
    if let Some(component) = entry.fingerprint.mismatch(current) {
        return Validation::Stale(StaleReason::Mismatch(component));
    }
    if !artifact_present {
        return Validation::Stale(StaleReason::ArtifactMissing);
    }
    Validation::Hit
}
