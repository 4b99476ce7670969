//! Per-project manifest ledgers.
//!
//! Each persistent lane keeps one `manifest.json` per project mapping page
//! index to the fingerprint and files of the artifact stored for it. Updates
//! replace whole entries: the manifest is rebuilt in memory, written to a
//! temporary sibling and renamed into place, so readers never observe a
//! half-written ledger. Writers for one project are serialized; different
//! projects proceed independently.
//!
//! Readers accept both the current envelope and the legacy bare-array form.

use super::atomic::{KeyLocks, write_atomic};
use super::fingerprint::Fingerprint;
use super::lane::Lane;
use crate::Error;
use crate::project::validate_project_key;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Manifest file name inside a project's lane directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Current manifest envelope version.
pub const MANIFEST_VERSION: u32 = 1;

/// Files making up one stored artifact, relative to the project's lane directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactFiles {
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Ledger row for one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ManifestEntry {
    pub page_index: usize,
    pub source_image_path: String,
    pub fingerprint: Fingerprint,
    pub artifact_files: ArtifactFiles,
    pub lane: Lane,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestFile {
    version: u32,
    project: String,
    entries: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ManifestOnDisk {
    Current(ManifestFile),
    Legacy(Vec<ManifestEntry>),
}

/// Manifest ledger for one lane.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    root: PathBuf,
    lane: Lane,
    locks: KeyLocks,
}

impl ManifestStore {
    pub fn new(root: impl Into<PathBuf>, lane: Lane) -> Self {
        Self { root: root.into(), lane, locks: KeyLocks::new() }
    }

    pub fn lane(&self) -> Lane {
        self.lane
    }

    /// Path of a project's manifest.
    pub fn path(&self, project: &str) -> Result<PathBuf, Error> {
        validate_project_key(project)?;
        Ok(self.root.join(project).join(MANIFEST_FILE))
    }

    fn lock_key(&self, project: &str) -> String {
        format!("manifest:{}:{project}", self.lane)
    }

    /// Load every entry of a project's manifest.
    ///
    /// # Errors
    ///
    /// Returns `Error::ManifestCorrupt` if the file exists but cannot be read
    /// or parsed. A missing file is an empty manifest.
    pub async fn load(&self, project: &str) -> Result<BTreeMap<usize, ManifestEntry>, Error> {
        let path = self.path(project)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(Error::ManifestCorrupt(format!("{}: {e}", path.display()))),
        };
        parse_manifest(&path, &bytes)
    }

    /// Load, treating a corrupt manifest as empty.
    async fn load_or_empty(&self, project: &str) -> Result<BTreeMap<usize, ManifestEntry>, Error> {
        match self.load(project).await {
            Ok(entries) => Ok(entries),
            Err(Error::ManifestCorrupt(msg)) => {
                tracing::warn!(project, lane = %self.lane, error = %msg, "manifest corrupt; treating as empty");
                Ok(BTreeMap::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Entry for one page, if recorded.
    pub async fn get(&self, project: &str, page_index: usize) -> Result<Option<ManifestEntry>, Error> {
        let mut entries = self.load_or_empty(project).await?;
        Ok(entries.remove(&page_index))
    }

    /// Replace the entry for `entry.page_index` as a whole.
    ///
    /// # Errors
    ///
    /// Returns `Error::WriteFailed` if the manifest cannot be persisted.
    pub async fn put(&self, project: &str, entry: ManifestEntry) -> Result<(), Error> {
        let path = self.path(project)?;
        let _guard = self.locks.lock(&self.lock_key(project)).await;

        let mut entries = self.load_or_empty(project).await?;
        entries.insert(entry.page_index, entry);
        self.persist(project, &path, entries).await
    }

    /// Remove the entry for a page, returning it if present.
    pub async fn remove(&self, project: &str, page_index: usize) -> Result<Option<ManifestEntry>, Error> {
        let path = self.path(project)?;
        let _guard = self.locks.lock(&self.lock_key(project)).await;

        let mut entries = self.load_or_empty(project).await?;
        let removed = entries.remove(&page_index);
        if removed.is_some() {
            self.persist(project, &path, entries).await?;
        }
        Ok(removed)
    }

    async fn persist(&self, project: &str, path: &Path, entries: BTreeMap<usize, ManifestEntry>) -> Result<(), Error> {
        let file = ManifestFile {
            version: MANIFEST_VERSION,
            project: project.to_string(),
            entries: entries.into_values().collect(),
        };
        let bytes = serde_json::to_vec_pretty(&file)
            .map_err(|e| Error::WriteFailed(format!("failed to serialize manifest: {e}")))?;
        write_atomic(path, &bytes)
            .await
            .map_err(|e| Error::WriteFailed(format!("{}: {e}", path.display())))?;

        tracing::debug!(project, lane = %self.lane, entries = file.entries.len(), "manifest written");
        Ok(())
    }
}

fn parse_manifest(path: &Path, bytes: &[u8]) -> Result<BTreeMap<usize, ManifestEntry>, Error> {
    let parsed: ManifestOnDisk =
        serde_json::from_slice(bytes).map_err(|e| Error::ManifestCorrupt(format!("{}: {e}", path.display())))?;

    let entries = match parsed {
        ManifestOnDisk::Current(file) => {
            if file.version > MANIFEST_VERSION {
                return Err(Error::ManifestCorrupt(format!(
                    "{}: unsupported manifest version {}",
                    path.display(),
                    file.version
                )));
            }
            file.entries
        }
        ManifestOnDisk::Legacy(entries) => entries,
    };

    Ok(entries.into_iter().map(|e| (e.page_index, e)).collect())
}
