//! Compatibility fingerprints for cached page results.
//!
//! A fingerprint captures everything that could make a cached OCR result
//! incompatible with the current inputs: the source image identity, the OCR
//! engine, the supporting geometry library and the derivation logic owned by
//! this crate. Versions that cannot be determined are recorded as
//! [`UNKNOWN_VERSION`] and still take part in equality, so an unknown version
//! never matches a concrete one.

use super::hash::file_hash;
use crate::Error;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Sentinel recorded for any version that could not be determined.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Version of the page derivation logic in this crate.
///
/// Bump when the way payloads are derived or stored changes.
pub const LOGIC_VERSION: &str = "folio-cache/2";

/// Identity of the OCR engine and supporting library that produced a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EngineIdentity {
    pub engine_id: Option<String>,
    pub engine_version: Option<String>,
    pub library_version: Option<String>,
}

impl EngineIdentity {
    pub fn new(engine_id: impl Into<String>, engine_version: impl Into<String>) -> Self {
        Self { engine_id: Some(engine_id.into()), engine_version: Some(engine_version.into()), library_version: None }
    }

    pub fn with_library_version(mut self, version: impl Into<String>) -> Self {
        self.library_version = Some(version.into());
        self
    }

    /// Fill fields missing here from `other`.
    pub fn or(self, other: &EngineIdentity) -> Self {
        Self {
            engine_id: self.engine_id.or_else(|| other.engine_id.clone()),
            engine_version: self.engine_version.or_else(|| other.engine_version.clone()),
            library_version: self.library_version.or_else(|| other.library_version.clone()),
        }
    }

    /// Whether any field known here disagrees with `other`.
    pub fn differs_from(&self, other: &EngineIdentity) -> bool {
        let differs = |a: &Option<String>, b: &Option<String>| a.is_some() && a != b;
        differs(&self.engine_id, &other.engine_id)
            || differs(&self.engine_version, &other.engine_version)
            || differs(&self.library_version, &other.library_version)
    }
}

/// Which fingerprint component differs between two fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Mismatch {
    ImageSize,
    ImageMtime,
    ImageHash,
    EngineId,
    EngineVersion,
    LibraryVersion,
    LogicVersion,
}

/// Immutable compatibility fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Fingerprint {
    pub image_size: u64,
    /// Source modification time in nanoseconds since the Unix epoch.
    pub image_mtime: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_sha256: Option<String>,
    pub engine_id: String,
    pub engine_version: String,
    pub library_version: String,
    pub logic_version: String,
}

impl Fingerprint {
    /// Fingerprint a source image against the given processing identity.
    ///
    /// # Errors
    ///
    /// Returns `Error::SourceUnavailable` if the image cannot be stat'd (or read,
    /// when `hash_content` is set). Missing versions never fail.
    pub async fn compute(
        source_image: &Path, identity: &EngineIdentity, logic_version: &str, hash_content: bool,
    ) -> Result<Self, Error> {
        let metadata = tokio::fs::metadata(source_image)
            .await
            .map_err(|e| Error::SourceUnavailable(format!("{}: {e}", source_image.display())))?;

        if !metadata.is_file() {
            return Err(Error::SourceUnavailable(format!("{}: not a file", source_image.display())));
        }

        let image_mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
            .unwrap_or(0);

        let image_sha256 = if hash_content {
            let hash = file_hash(source_image)
                .await
                .map_err(|e| Error::SourceUnavailable(format!("{}: {e}", source_image.display())))?;
            Some(hash)
        } else {
            None
        };

        Ok(Self {
            image_size: metadata.len(),
            image_mtime,
            image_sha256,
            engine_id: known_or_unknown(identity.engine_id.as_deref()),
            engine_version: known_or_unknown(identity.engine_version.as_deref()),
            library_version: known_or_unknown(identity.library_version.as_deref()),
            logic_version: known_or_unknown(Some(logic_version)),
        })
    }

    /// The same fingerprint recorded against another processing identity.
    pub fn with_identity(self, identity: &EngineIdentity) -> Self {
        Self {
            engine_id: known_or_unknown(identity.engine_id.as_deref()),
            engine_version: known_or_unknown(identity.engine_version.as_deref()),
            library_version: known_or_unknown(identity.library_version.as_deref()),
            ..self
        }
    }

    /// First component that differs from `other`, if any.
    pub fn mismatch(&self, other: &Fingerprint) -> Option<Mismatch> {
        if self.image_size != other.image_size {
            Some(Mismatch::ImageSize)
        } else if self.image_mtime != other.image_mtime {
            Some(Mismatch::ImageMtime)
        } else if self.image_sha256 != other.image_sha256 {
            Some(Mismatch::ImageHash)
        } else if self.engine_id != other.engine_id {
            Some(Mismatch::EngineId)
        } else if self.engine_version != other.engine_version {
            Some(Mismatch::EngineVersion)
        } else if self.library_version != other.library_version {
            Some(Mismatch::LibraryVersion)
        } else if self.logic_version != other.logic_version {
            Some(Mismatch::LogicVersion)
        } else {
            None
        }
    }
}

fn known_or_unknown(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => UNKNOWN_VERSION.to_string(),
    }
}
