//! Filesystem-backed page artifact cache.
//!
//! This module provides the persistence layer under the orchestrator:
//!
//! - Compatibility fingerprints for source images and OCR identity
//! - Per-project manifest ledgers with atomic whole-file replacement
//! - Lane-disjoint artifact storage (auto-cache and user-saved)
//! - Pure hit/miss/stale validation
//! - Best-effort session snapshots

pub mod artifacts;
pub mod atomic;
pub mod document;
pub mod fingerprint;
pub mod hash;
pub mod lane;
pub mod manifest;
pub mod session;
pub mod validator;

pub use crate::Error;

pub use artifacts::{Artifact, ArtifactStore, SlotGuard};
pub use document::{PageMetadata, Provenance, SavedBy};
pub use fingerprint::{EngineIdentity, Fingerprint, LOGIC_VERSION, Mismatch, UNKNOWN_VERSION};
pub use lane::Lane;
pub use manifest::{ArtifactFiles, ManifestEntry, ManifestStore};
pub use session::SessionSnapshotStore;
pub use validator::{StaleReason, Validation, validate};
