//! Cache orchestration.
//!
//! [`PageCache`] is shared by every session of a process and owns the
//! persistent stores, the OCR engine and the background persistence queue.
//! [`Session`] is the per-connection context: it tracks navigation, holds the
//! raw lane of freshly computed pages, and is the only producer of
//! [`PageStatus`].
//!
//! A page request runs fingerprint, validate, then either serves the cached
//! artifact or recomputes and hands the result to the persistence queue.
//! Cache-layer failures degrade to recomputation; only a missing source image,
//! invalid input or a failing OCR engine reach the caller.

use crate::Error;
use crate::cache::document::{AppInfo, ArtifactSource, OcrProvenance, PageMetadata, Provenance, SavedBy, SchemaTag};
use crate::cache::{
    Artifact, ArtifactStore, EngineIdentity, Fingerprint, LOGIC_VERSION, Lane, ManifestEntry, ManifestStore,
    SessionSnapshotStore, Validation, validate,
};
use crate::config::AppConfig;
use crate::engine::OcrEngine;
use crate::project::{PageRef, ProjectCatalog, ProjectSummary, validate_project_key};
use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

mod persist;
mod session;

pub use persist::{AutoCacheWriter, PersistJob, PersistQueue};
pub use session::Session;

/// Where a served page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    /// Freshly computed and not yet known to be durably cached.
    Raw,
    /// Served from the auto-cache lane with a matching fingerprint.
    Cached,
    /// Served from the user-saved lane.
    Labeled,
}

/// A page ready for display.
#[derive(Debug, Clone)]
pub struct LoadedPage {
    pub project: String,
    pub page_index: usize,
    pub status: PageStatus,
    pub payload: serde_json::Value,
    pub metadata: PageMetadata,
    pub ground_truth: Option<String>,
    /// Source image of the page.
    pub image_path: PathBuf,
}

/// Result of a page request.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Ready(Box<LoadedPage>),
    /// The session moved elsewhere while this request was in flight.
    Superseded { project: String, page_index: usize },
}

/// Process-wide cache state shared by all sessions.
pub struct PageCache {
    catalog: ProjectCatalog,
    artifacts: ArtifactStore,
    auto_manifest: ManifestStore,
    user_manifest: ManifestStore,
    snapshots: SessionSnapshotStore,
    engine: Arc<dyn OcrEngine>,
    fallback_identity: EngineIdentity,
    hash_content: bool,
    writer: AutoCacheWriter,
    queue: PersistQueue,
}

impl std::fmt::Debug for PageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageCache")
            .field("catalog", &self.catalog)
            .field("artifacts", &self.artifacts)
            .field("hash_content", &self.hash_content)
            .finish_non_exhaustive()
    }
}

impl PageCache {
    /// Build the shared cache and start its persistence workers.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `Error::LaneConflict` if the configured lane directories overlap.
    pub fn new(config: &AppConfig, engine: Arc<dyn OcrEngine>) -> Result<Arc<Self>, Error> {
        let cache_dir = config.cache_dir();
        let labeled_dir = config.labeled_dir();
        let artifacts = ArtifactStore::new(&cache_dir, &labeled_dir)?;
        let auto_manifest = ManifestStore::new(&cache_dir, Lane::AutoCache);
        let user_manifest = ManifestStore::new(&labeled_dir, Lane::UserSaved);
        let writer = AutoCacheWriter::new(artifacts.clone(), auto_manifest.clone());
        let queue = PersistQueue::start(writer.clone(), config.persist_queue_capacity, config.persist_workers);

        tracing::info!(
            projects_root = %config.projects_root.display(),
            cache_dir = %cache_dir.display(),
            labeled_dir = %labeled_dir.display(),
            content_hash = config.content_hash,
            "page cache ready"
        );

        Ok(Arc::new(Self {
            catalog: ProjectCatalog::new(&config.projects_root),
            artifacts,
            auto_manifest,
            user_manifest,
            snapshots: SessionSnapshotStore::new(config.session_file()),
            engine,
            fallback_identity: EngineIdentity { library_version: config.library_version.clone(), ..Default::default() },
            hash_content: config.content_hash,
            writer,
            queue,
        }))
    }

    pub fn catalog(&self) -> &ProjectCatalog {
        &self.catalog
    }

    pub async fn list_projects(&self) -> Vec<ProjectSummary> {
        self.catalog.list_projects().await
    }

    /// Resolve once every queued auto-cache write has finished or been skipped.
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await;
    }

    /// Identity of the engine as it stands now, with configured fallbacks.
    async fn identity(&self) -> EngineIdentity {
        self.engine.identity().await.or(&self.fallback_identity)
    }

    async fn fingerprint(&self, page: &PageRef, identity: &EngineIdentity) -> Result<Fingerprint, Error> {
        Fingerprint::compute(&page.image_path, identity, LOGIC_VERSION, self.hash_content).await
    }

    /// User-saved artifact for a page. Unreadable artifacts count as absent.
    async fn read_labeled(&self, project: &str, page_index: usize) -> Result<Option<Artifact>, Error> {
        match self.artifacts.read(Lane::UserSaved, project, page_index).await {
            Ok(found) => Ok(found),
            Err(e) if e.is_advisory() => {
                tracing::warn!(project, page_index, lane = %Lane::UserSaved, error = %e, "ignoring unreadable artifact");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Validate the auto-cache lane against `current`.
    async fn check_cached(&self, project: &str, page_index: usize, current: &Fingerprint) -> Validation {
        let entry = match self.auto_manifest.get(project, page_index).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(project, page_index, error = %e, "manifest lookup failed");
                None
            }
        };
        let present = match &entry {
            Some(entry) => {
                self.artifacts
                    .exists(Lane::AutoCache, project, &entry.artifact_files)
                    .await
            }
            None => false,
        };
        validate(current, entry.as_ref(), present)
    }

    /// Serve a page from the auto-cache lane if its fingerprint still matches.
    async fn read_cached(&self, project: &str, page_index: usize, current: &Fingerprint) -> Option<Artifact> {
        match self.check_cached(project, page_index, current).await {
            Validation::Hit => {}
            Validation::Miss => {
                tracing::debug!(project, page_index, "cache miss");
                return None;
            }
            Validation::Stale(reason) => {
                tracing::debug!(project, page_index, reason = %reason, "cache stale");
                return None;
            }
        }

        match self.artifacts.read(Lane::AutoCache, project, page_index).await {
            Ok(Some(artifact)) => {
                tracing::debug!(project, page_index, "cache hit");
                Some(artifact)
            }
            Ok(None) => {
                tracing::debug!(project, page_index, "cache entry vanished");
                None
            }
            Err(e) => {
                tracing::warn!(project, page_index, lane = %Lane::AutoCache, error = %e, "cached artifact unusable");
                None
            }
        }
    }

    /// Run OCR for a page and package the result for the raw lane.
    ///
    /// The fingerprint records `identity` as it stood before recognition
    /// unless the engine reports something different while recognizing, in
    /// which case the reported identity wins.
    async fn recompute(
        &self, page: &PageRef, fingerprint: Fingerprint, identity: &EngineIdentity,
    ) -> Result<PersistJob, Error> {
        tracing::debug!(project = %page.project, page_index = page.page_index, "recomputing page");
        let output = self.engine.recognize(&page.image_path).await?;
        let ocr = output.reported.clone().or(identity);
        let fingerprint = if output.reported.differs_from(identity) {
            tracing::info!(
                project = %page.project,
                page_index = page.page_index,
                expected = ?identity,
                reported = ?output.reported,
                "engine reported a different identity"
            );
            fingerprint.with_identity(&ocr)
        } else {
            fingerprint
        };

        let metadata = PageMetadata {
            schema: SchemaTag::default(),
            provenance: Provenance {
                saved_at: Utc::now(),
                saved_by: SavedBy::AutoCache,
                source_lane: Lane::Raw,
                app: AppInfo::default(),
                ocr: OcrProvenance::from(&ocr),
            },
            source: source_of(page, Some(fingerprint.clone())),
            files: None,
        };
        Ok(PersistJob {
            project: page.project.clone(),
            page_index: page.page_index,
            source_image_path: page.relative_path.clone(),
            fingerprint,
            artifact: Artifact { page: output.page, metadata, image: Some(page.image_path.clone()) },
        })
    }

    /// Write a payload to the user-saved lane, waiting for the slot.
    async fn save(&self, page: &PageRef, payload: serde_json::Value, ocr: OcrProvenance) -> Result<(), Error> {
        if !payload.is_object() {
            return Err(Error::InvalidInput("page payload must be a JSON object".into()));
        }
        let identity = self.identity().await;
        let fingerprint = self.fingerprint(page, &identity).await?;

        let metadata = PageMetadata {
            schema: SchemaTag::default(),
            provenance: Provenance {
                saved_at: Utc::now(),
                saved_by: SavedBy::SavePage,
                source_lane: Lane::UserSaved,
                app: AppInfo::default(),
                ocr,
            },
            source: source_of(page, Some(fingerprint.clone())),
            files: None,
        };
        let artifact = Artifact { page: payload, metadata, image: Some(page.image_path.clone()) };

        let slot = self
            .artifacts
            .lock_slot(Lane::UserSaved, &page.project, page.page_index)
            .await?;
        let files = self.artifacts.write(&slot, &artifact).await?;

        let entry = ManifestEntry {
            page_index: page.page_index,
            source_image_path: page.relative_path.clone(),
            fingerprint,
            artifact_files: files,
            lane: Lane::UserSaved,
            saved_at: artifact.metadata.provenance.saved_at,
        };
        if let Err(e) = self.user_manifest.put(&page.project, entry).await {
            tracing::warn!(project = %page.project, page_index = page.page_index, error = %e, "user-saved ledger not updated");
        }
        tracing::info!(project = %page.project, page_index = page.page_index, "page saved");
        Ok(())
    }

    /// Remove a user-saved page.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the page has no user-saved artifact.
    pub async fn delete_page(&self, project: &str, page_index: usize) -> Result<(), Error> {
        validate_project_key(project)?;
        let slot = self.artifacts.lock_slot(Lane::UserSaved, project, page_index).await?;
        if !self.artifacts.delete(&slot).await? {
            return Err(Error::NotFound(format!("no saved page {page_index} in project {project}")));
        }
        if let Err(e) = self.user_manifest.remove(project, page_index).await {
            tracing::warn!(project, page_index, error = %e, "user-saved ledger not updated");
        }
        tracing::info!(project, page_index, "saved page deleted");
        Ok(())
    }

    /// Last recorded position, if it still names an existing page.
    pub async fn restore_session(&self) -> Option<(String, usize)> {
        let (project, page_index) = self.snapshots.load().await?;
        if self.catalog.contains(&project, page_index).await {
            Some((project, page_index))
        } else {
            tracing::debug!(project = %project, page_index, "session snapshot names a missing page");
            None
        }
    }

    /// Record a position. Write failures are logged and swallowed.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for an unusable project key.
    pub async fn record_session(&self, project: &str, page_index: usize) -> Result<(), Error> {
        validate_project_key(project)?;
        self.snapshots.save(project, page_index).await;
        Ok(())
    }

    /// Whether the auto-cache lane already holds a usable copy of `job`.
    async fn is_cached(&self, job: &PersistJob) -> bool {
        self.check_cached(&job.project, job.page_index, &job.fingerprint)
            .await
            .is_usable()
    }
}

fn source_of(page: &PageRef, fingerprint: Option<Fingerprint>) -> ArtifactSource {
    ArtifactSource {
        project_id: page.project.clone(),
        page_index: page.page_index,
        page_number: page.page_number(),
        image_path: page.relative_path.clone(),
        fingerprint,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::engine::OcrOutput;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Engine double that counts recognitions.
    #[derive(Debug)]
    pub struct FakeEngine {
        calls: AtomicUsize,
        version: Mutex<Option<String>>,
        library_version: Mutex<Option<String>>,
        reported_version: Mutex<Option<String>>,
        fail: Mutex<bool>,
    }

    impl FakeEngine {
        pub fn new(version: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                version: Mutex::new(Some(version.to_string())),
                library_version: Mutex::new(Some("0.9.2".to_string())),
                reported_version: Mutex::new(None),
                fail: Mutex::new(false),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn set_version(&self, version: &str) {
            *self.version.lock().unwrap() = Some(version.to_string());
        }

        pub fn set_library_version(&self, version: Option<&str>) {
            *self.library_version.lock().unwrap() = version.map(str::to_string);
        }

        /// Engine version reported with each recognition, independent of `identity`.
        pub fn set_reported_version(&self, version: Option<&str>) {
            *self.reported_version.lock().unwrap() = version.map(str::to_string);
        }

        pub fn set_failing(&self, fail: bool) {
            *self.fail.lock().unwrap() = fail;
        }
    }

    #[async_trait]
    impl OcrEngine for FakeEngine {
        async fn identity(&self) -> EngineIdentity {
            EngineIdentity {
                engine_id: Some("fake-ocr".into()),
                engine_version: self.version.lock().unwrap().clone(),
                library_version: self.library_version.lock().unwrap().clone(),
            }
        }

        async fn recognize(&self, image_path: &Path) -> Result<OcrOutput, Error> {
            if *self.fail.lock().unwrap() {
                return Err(Error::OcrFailed("engine offline".into()));
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let name = image_path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            Ok(OcrOutput {
                page: serde_json::json!({"items": [{"text": format!("{name} run {n}")}]}),
                reported: EngineIdentity {
                    engine_version: self.reported_version.lock().unwrap().clone(),
                    ..Default::default()
                },
            })
        }
    }

    /// Projects root with `bookA` (three pages) and a data root, both temporary.
    pub struct Harness {
        pub dir: tempfile::TempDir,
        pub config: AppConfig,
        pub engine: Arc<FakeEngine>,
        pub cache: Arc<PageCache>,
    }

    impl Harness {
        pub fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let book = dir.path().join("projects").join("bookA");
            std::fs::create_dir_all(&book).unwrap();
            for name in ["001.png", "002.png", "003.png"] {
                std::fs::write(book.join(name), format!("pixels of {name}")).unwrap();
            }
            std::fs::write(book.join("pages.json"), r#"{"001.png": "first page text"}"#).unwrap();

            let config = AppConfig::with_roots(dir.path().join("projects"), dir.path().join("data"));
            let engine = FakeEngine::new("1.0");
            let cache = PageCache::new(&config, engine.clone()).unwrap();
            Self { dir, config, engine, cache }
        }

        pub fn session(&self) -> Session {
            Session::new(Arc::clone(&self.cache))
        }

        pub fn image(&self, name: &str) -> PathBuf {
            self.dir.path().join("projects").join("bookA").join(name)
        }
    }
}
