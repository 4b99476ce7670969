//! On-disk artifact documents.
//!
//! Artifacts are stored as a versioned envelope that keeps cache bookkeeping
//! (provenance, source identity) beside the OCR payload rather than inside
//! it. The older flat layout (`{source_lib, source_path, pages: [...]}`) is
//! still readable so labeled pages saved before the envelope existed keep
//! loading.

use super::fingerprint::{EngineIdentity, Fingerprint, UNKNOWN_VERSION};
use super::lane::Lane;
use super::manifest::ArtifactFiles;
use crate::Error;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const SCHEMA_NAME: &str = "folio.page_artifact";
pub const SCHEMA_VERSION: &str = "2.0";
pub const APP_NAME: &str = "folio";

/// Legacy marker written by the flat layout.
pub const LEGACY_SOURCE_LIB: &str = "doctr-pgdp-labeled";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SchemaTag {
    pub name: String,
    pub version: String,
}

impl Default for SchemaTag {
    fn default() -> Self {
        Self { name: SCHEMA_NAME.into(), version: SCHEMA_VERSION.into() }
    }
}

/// What wrote an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SavedBy {
    SavePage,
    AutoCache,
    Legacy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self { name: APP_NAME.into(), version: env!("CARGO_PKG_VERSION").into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OcrProvenance {
    pub engine: String,
    pub engine_version: String,
    pub library_version: String,
}

impl From<&EngineIdentity> for OcrProvenance {
    fn from(identity: &EngineIdentity) -> Self {
        let or_unknown = |v: &Option<String>| v.clone().unwrap_or_else(|| UNKNOWN_VERSION.to_string());
        Self {
            engine: or_unknown(&identity.engine_id),
            engine_version: or_unknown(&identity.engine_version),
            library_version: or_unknown(&identity.library_version),
        }
    }
}

/// Who saved an artifact, when, and with which toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Provenance {
    pub saved_at: DateTime<Utc>,
    pub saved_by: SavedBy,
    pub source_lane: Lane,
    #[serde(default)]
    pub app: AppInfo,
    pub ocr: OcrProvenance,
}

/// Identity of the page an artifact was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactSource {
    pub project_id: String,
    pub page_index: usize,
    pub page_number: usize,
    pub image_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
}

/// Cache-owned metadata passed alongside an OCR payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PageMetadata {
    pub schema: SchemaTag,
    pub provenance: Provenance,
    pub source: ArtifactSource,
    /// Stored file names, filled in by the artifact store on write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<ArtifactFiles>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PayloadBlock {
    page: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    schema: SchemaTag,
    provenance: Provenance,
    source: ArtifactSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    files: Option<ArtifactFiles>,
    payload: PayloadBlock,
}

#[derive(Debug, Deserialize)]
struct LegacyDocument {
    #[serde(default)]
    source_lib: Option<String>,
    #[serde(default)]
    source_path: Option<String>,
    pages: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OnDisk {
    Envelope(Envelope),
    Legacy(LegacyDocument),
}

/// Serialize a payload and its metadata as an envelope document.
pub fn encode(page: &serde_json::Value, metadata: &PageMetadata) -> Result<Vec<u8>, Error> {
    let envelope = Envelope {
        schema: metadata.schema.clone(),
        provenance: metadata.provenance.clone(),
        source: metadata.source.clone(),
        files: metadata.files.clone(),
        payload: PayloadBlock { page: page.clone() },
    };
    serde_json::to_vec_pretty(&envelope).map_err(|e| Error::WriteFailed(format!("failed to serialize artifact: {e}")))
}

/// Context used to fill metadata for legacy documents that carry none.
#[derive(Debug, Clone)]
pub struct LegacyContext<'a> {
    pub project: &'a str,
    pub page_index: usize,
    pub saved_at: DateTime<Utc>,
}

/// Parse an artifact document in either layout.
///
/// # Errors
///
/// Returns `Error::ArtifactCorrupt` if the bytes are neither a known envelope
/// nor a legacy document with at least one page object.
pub fn decode(bytes: &[u8], legacy: &LegacyContext<'_>) -> Result<(serde_json::Value, PageMetadata), Error> {
    let parsed: OnDisk = serde_json::from_slice(bytes).map_err(|e| Error::ArtifactCorrupt(e.to_string()))?;

    match parsed {
        OnDisk::Envelope(envelope) => {
            if envelope.schema.name != SCHEMA_NAME {
                return Err(Error::ArtifactCorrupt(format!("unknown schema: {}", envelope.schema.name)));
            }
            if !envelope.payload.page.is_object() {
                return Err(Error::ArtifactCorrupt("payload page is not an object".into()));
            }
            let metadata = PageMetadata {
                schema: envelope.schema,
                provenance: envelope.provenance,
                source: envelope.source,
                files: envelope.files,
            };
            Ok((envelope.payload.page, metadata))
        }
        OnDisk::Legacy(doc) => {
            let page = doc
                .pages
                .into_iter()
                .next()
                .filter(serde_json::Value::is_object)
                .ok_or_else(|| Error::ArtifactCorrupt("legacy document has no page object".into()))?;
            tracing::debug!(
                project = legacy.project,
                page_index = legacy.page_index,
                source_lib = doc.source_lib.as_deref().unwrap_or(LEGACY_SOURCE_LIB),
                "read legacy artifact"
            );
            let metadata = PageMetadata {
                schema: SchemaTag { name: SCHEMA_NAME.into(), version: "1.0".into() },
                provenance: Provenance {
                    saved_at: legacy.saved_at,
                    saved_by: SavedBy::Legacy,
                    source_lane: Lane::UserSaved,
                    app: AppInfo::default(),
                    ocr: OcrProvenance::from(&EngineIdentity::default()),
                },
                source: ArtifactSource {
                    project_id: legacy.project.to_string(),
                    page_index: legacy.page_index,
                    page_number: legacy.page_index + 1,
                    image_path: doc.source_path.unwrap_or_default(),
                    fingerprint: None,
                },
                files: None,
            };
            Ok((page, metadata))
        }
    }
}
