//! Artifact storage for the persistent lanes.
//!
//! Layout, per lane root:
//!
//! ```text
//! <root>/<project>/page_0003.json            envelope document (commit point)
//! <root>/<project>/page_0003.<gen>.png       copy of the source image
//! <root>/<project>/manifest.json             ledger (see `manifest`)
//! ```
//!
//! The image is written under a fresh generation name before the document,
//! and the document names the image it belongs to. Renaming the document into
//! place therefore swaps payload and image together; a crash in between
//! leaves an orphan image that the next write of that page removes.
//!
//! The user-saved lane also reads the flat legacy layout
//! `<root>/<project>_<NNN>.json` (1-based page number) when no current
//! document exists.

use super::atomic::{KeyGuard, KeyLocks, copy_atomic, is_temp_file, write_atomic};
use super::document::{self, LegacyContext, PageMetadata};
use super::hash::{content_hash, slot_key};
use super::lane::Lane;
use super::manifest::ArtifactFiles;
use crate::Error;
use crate::config::dirs_overlap;
use crate::project::{IMAGE_EXTS, validate_project_key};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static GENERATION: AtomicU64 = AtomicU64::new(0);

/// A page payload with its metadata and image.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub page: serde_json::Value,
    pub metadata: PageMetadata,
    /// On write: the image to store alongside. On read: the stored copy.
    pub image: Option<PathBuf>,
}

/// Exclusive hold on one (lane, project, page) slot.
///
/// Writes and deletes require a guard, so every mutation of a slot is
/// serialized with other writers of the same slot.
#[derive(Debug)]
pub struct SlotGuard {
    lane: Lane,
    project: String,
    page_index: usize,
    _guard: KeyGuard,
}

impl SlotGuard {
    pub fn lane(&self) -> Lane {
        self.lane
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }
}

fn payload_name(page_index: usize) -> String {
    format!("page_{page_index:04}.json")
}

fn image_prefix(page_index: usize) -> String {
    format!("page_{page_index:04}.")
}

fn legacy_stem(project: &str, page_index: usize) -> String {
    format!("{project}_{:03}", page_index + 1)
}

/// Artifact files for the auto-cache and user-saved lanes.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    cache_root: PathBuf,
    labeled_root: PathBuf,
    locks: KeyLocks,
}

impl ArtifactStore {
    /// # Errors
    ///
    /// Returns `Error::LaneConflict` if either root contains the other.
    pub fn new(cache_root: impl Into<PathBuf>, labeled_root: impl Into<PathBuf>) -> Result<Self, Error> {
        let cache_root = cache_root.into();
        let labeled_root = labeled_root.into();
        if dirs_overlap(&cache_root, &labeled_root) {
            return Err(Error::LaneConflict(format!(
                "auto-cache root {} overlaps user-saved root {}",
                cache_root.display(),
                labeled_root.display()
            )));
        }
        Ok(Self { cache_root, labeled_root, locks: KeyLocks::new() })
    }

    /// Storage root of a persistent lane.
    pub fn lane_root(&self, lane: Lane) -> Result<&Path, Error> {
        match lane {
            Lane::AutoCache => Ok(&self.cache_root),
            Lane::UserSaved => Ok(&self.labeled_root),
            Lane::Raw => Err(Error::InvalidInput("the raw lane has no storage".into())),
        }
    }

    /// Project directory of a lane, checked to lie inside that lane only.
    fn project_dir(&self, lane: Lane, project: &str) -> Result<PathBuf, Error> {
        validate_project_key(project)?;
        let root = self.lane_root(lane)?;
        let dir = root.join(project);
        let other = match lane {
            Lane::AutoCache => &self.labeled_root,
            _ => &self.cache_root,
        };
        if !dir.starts_with(root) || dir.starts_with(other) {
            return Err(Error::LaneConflict(format!("{} is not owned by the {lane} lane", dir.display())));
        }
        Ok(dir)
    }

    /// Wait for exclusive access to a slot.
    pub async fn lock_slot(&self, lane: Lane, project: &str, page_index: usize) -> Result<SlotGuard, Error> {
        self.project_dir(lane, project)?;
        let guard = self.locks.lock(&slot_key(lane.as_str(), project, page_index)).await;
        Ok(SlotGuard { lane, project: project.to_string(), page_index, _guard: guard })
    }

    /// Take a slot only if no other writer holds it.
    pub fn try_lock_slot(&self, lane: Lane, project: &str, page_index: usize) -> Result<Option<SlotGuard>, Error> {
        self.project_dir(lane, project)?;
        Ok(self
            .locks
            .try_lock(&slot_key(lane.as_str(), project, page_index))
            .map(|guard| SlotGuard { lane, project: project.to_string(), page_index, _guard: guard }))
    }

    /// Whether every file named by `files` is present.
    pub async fn exists(&self, lane: Lane, project: &str, files: &ArtifactFiles) -> bool {
        let Ok(dir) = self.project_dir(lane, project) else {
            return false;
        };
        let present = |name: &str| {
            let path = dir.join(name);
            async move { tokio::fs::try_exists(&path).await.unwrap_or(false) }
        };
        if !present(&files.payload).await {
            return false;
        }
        match &files.image {
            Some(image) => present(image).await,
            None => true,
        }
    }

    /// Read a stored artifact.
    ///
    /// # Errors
    ///
    /// Returns `Error::ArtifactCorrupt` if a document exists but cannot be
    /// read, decoded, or belongs to a different page.
    pub async fn read(&self, lane: Lane, project: &str, page_index: usize) -> Result<Option<Artifact>, Error> {
        let dir = self.project_dir(lane, project)?;
        let path = dir.join(payload_name(page_index));

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let (page, metadata) = decode_for(&bytes, project, page_index, &path)?;
                let image = match metadata.files.as_ref().and_then(|f| f.image.as_ref()) {
                    Some(name) => existing(dir.join(name)).await,
                    None => None,
                };
                Ok(Some(Artifact { page, metadata, image }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if lane == Lane::UserSaved {
                    self.read_legacy(project, page_index).await
                } else {
                    Ok(None)
                }
            }
            Err(e) => Err(Error::ArtifactCorrupt(format!("{}: {e}", path.display()))),
        }
    }

    async fn read_legacy(&self, project: &str, page_index: usize) -> Result<Option<Artifact>, Error> {
        let stem = legacy_stem(project, page_index);
        let path = self.labeled_root.join(format!("{stem}.json"));
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::ArtifactCorrupt(format!("{}: {e}", path.display()))),
        };
        let (page, metadata) = decode_for(&bytes, project, page_index, &path)?;

        let mut image = None;
        for ext in IMAGE_EXTS {
            if let Some(found) = existing(self.labeled_root.join(format!("{stem}.{ext}"))).await {
                image = Some(found);
                break;
            }
        }
        tracing::debug!(project, page_index, path = %path.display(), "read legacy labeled artifact");
        Ok(Some(Artifact { page, metadata, image }))
    }

    /// Write an artifact into the guarded slot, replacing any previous one.
    ///
    /// The stored metadata is stamped with the slot's lane and the files
    /// written, which are also returned for the manifest.
    ///
    /// # Errors
    ///
    /// Returns `Error::WriteFailed` if the image copy or the document write
    /// fails. The previous artifact, if any, is left intact.
    pub async fn write(&self, slot: &SlotGuard, artifact: &Artifact) -> Result<ArtifactFiles, Error> {
        let dir = self.project_dir(slot.lane, &slot.project)?;
        let payload = payload_name(slot.page_index);

        let image = match &artifact.image {
            Some(src) => {
                let ext = src
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(str::to_ascii_lowercase)
                    .unwrap_or_else(|| "png".to_string());
                let seq = GENERATION.fetch_add(1, Ordering::Relaxed);
                let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
                let generation = content_hash(format!("{}:{stamp}:{seq}", std::process::id()).as_bytes());
                let name = format!("{}{}.{ext}", image_prefix(slot.page_index), &generation[..12]);
                copy_atomic(src, &dir.join(&name))
                    .await
                    .map_err(|e| Error::WriteFailed(format!("{} -> {}: {e}", src.display(), dir.join(&name).display())))?;
                Some(name)
            }
            None => None,
        };

        let files = ArtifactFiles { payload: payload.clone(), image };
        let mut metadata = artifact.metadata.clone();
        metadata.provenance.source_lane = slot.lane;
        metadata.files = Some(files.clone());

        let bytes = document::encode(&artifact.page, &metadata)?;
        let dest = dir.join(&payload);
        let previous = committed_image(&dest).await;
        if let Err(e) = write_atomic(&dest, &bytes).await {
            if let Some(name) = &files.image {
                let _ = tokio::fs::remove_file(dir.join(name)).await;
            }
            return Err(Error::WriteFailed(format!("{}: {e}", dest.display())));
        }

        let keep: Vec<&str> = files.image.iter().chain(previous.iter()).map(String::as_str).collect();
        self.remove_stale_images(&dir, slot.page_index, &keep).await;
        tracing::debug!(
            project = %slot.project,
            page_index = slot.page_index,
            lane = %slot.lane,
            "artifact written"
        );
        Ok(files)
    }

    /// Delete the guarded slot's artifact, including legacy user-saved files.
    ///
    /// Returns whether anything was removed.
    pub async fn delete(&self, slot: &SlotGuard) -> Result<bool, Error> {
        let dir = self.project_dir(slot.lane, &slot.project)?;
        let mut removed = remove_if_present(&dir.join(payload_name(slot.page_index))).await?;
        removed |= self.remove_stale_images(&dir, slot.page_index, &[]).await;

        if slot.lane == Lane::UserSaved {
            let stem = legacy_stem(&slot.project, slot.page_index);
            removed |= remove_if_present(&self.labeled_root.join(format!("{stem}.json"))).await?;
            for ext in IMAGE_EXTS {
                removed |= remove_if_present(&self.labeled_root.join(format!("{stem}.{ext}"))).await?;
            }
        }
        Ok(removed)
    }

    /// Remove images of a page other than `keep`. Failures are logged only.
    ///
    /// Writes keep the image of the document they replaced, so a reader that
    /// loaded that document just before the rename still finds its image. A
    /// reader that falls two writes behind gets `image: None` from [`Self::read`].
    async fn remove_stale_images(&self, dir: &Path, page_index: usize, keep: &[&str]) -> bool {
        let prefix = image_prefix(page_index);
        let payload = payload_name(page_index);
        let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
            return false;
        };

        let mut removed = false;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(&prefix) || name == payload || keep.contains(&name) {
                continue;
            }
            if is_temp_file(&path) {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed = true,
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove stale page image"),
            }
        }
        removed
    }
}

/// Image named by the document committed at `path`, if any.
async fn committed_image(path: &Path) -> Option<String> {
    let bytes = tokio::fs::read(path).await.ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    value.get("files")?.get("image")?.as_str().map(str::to_string)
}

fn decode_for(
    bytes: &[u8], project: &str, page_index: usize, path: &Path,
) -> Result<(serde_json::Value, PageMetadata), Error> {
    let legacy = LegacyContext { project, page_index, saved_at: Utc::now() };
    let (page, metadata) = document::decode(bytes, &legacy)
        .map_err(|e| Error::ArtifactCorrupt(format!("{}: {e}", path.display())))?;
    if metadata.source.project_id != project || metadata.source.page_index != page_index {
        return Err(Error::ArtifactCorrupt(format!(
            "{} belongs to {}#{}",
            path.display(),
            metadata.source.project_id,
            metadata.source.page_index
        )));
    }
    Ok((page, metadata))
}

async fn existing(path: PathBuf) -> Option<PathBuf> {
    tokio::fs::try_exists(&path)
        .await
        .unwrap_or(false)
        .then_some(path)
}

async fn remove_if_present(path: &Path) -> Result<bool, Error> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::WriteFailed(format!("{}: {e}", path.display()))),
    }
}
