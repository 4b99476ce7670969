//! Per-connection session context.

use super::{LoadOutcome, LoadedPage, PageCache, PageStatus, PersistJob};
use crate::Error;
use crate::cache::document::OcrProvenance;
use crate::cache::{Artifact, Fingerprint};
use crate::project::{ProjectSummary, validate_project_key};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub(crate) type PageKey = (String, usize);

/// Freshly computed pages of one session, held until they are known to be
/// cached. Persistence workers release entries once they commit them.
#[derive(Debug, Default)]
pub(crate) struct RawLane {
    pages: Mutex<HashMap<PageKey, PersistJob>>,
}

impl RawLane {
    async fn get(&self, key: &PageKey) -> Option<PersistJob> {
        self.pages.lock().await.get(key).cloned()
    }

    async fn insert(&self, job: PersistJob) {
        let key = (job.project.clone(), job.page_index);
        self.pages.lock().await.insert(key, job);
    }

    async fn remove(&self, key: &PageKey) {
        self.pages.lock().await.remove(key);
    }

    /// Drop `key` if it still holds the page computed under `fingerprint`.
    pub(crate) async fn release(&self, key: &PageKey, fingerprint: &Fingerprint) -> bool {
        let mut pages = self.pages.lock().await;
        match pages.get(key) {
            Some(job) if &job.fingerprint == fingerprint => {
                pages.remove(key);
                true
            }
            _ => false,
        }
    }

    async fn drain(&self) -> Vec<PersistJob> {
        self.pages.lock().await.drain().map(|(_, job)| job).collect()
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.pages.lock().await.len()
    }
}

/// Navigation state and raw lane of one client.
///
/// Sessions never share loaded pages; only the stores behind [`PageCache`]
/// are common to all of them.
#[derive(Debug)]
pub struct Session {
    cache: Arc<PageCache>,
    /// Page the client most recently asked for.
    target: Mutex<Option<PageKey>>,
    raw: Arc<RawLane>,
}

impl Session {
    pub fn new(cache: Arc<PageCache>) -> Self {
        Self { cache, target: Mutex::new(None), raw: Arc::new(RawLane::default()) }
    }

    pub fn cache(&self) -> &Arc<PageCache> {
        &self.cache
    }

    pub async fn list_projects(&self) -> Vec<ProjectSummary> {
        self.cache.list_projects().await
    }

    /// Load a page for display.
    ///
    /// Resolution order is user-saved, then a validated auto-cache entry,
    /// then this session's raw lane, then recomputation. A result for a page
    /// the session has since navigated away from comes back as
    /// [`LoadOutcome::Superseded`]; its computation is still persisted.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidInput` for an unusable project key
    /// - `Error::SourceUnavailable` if the page or its image is missing
    /// - `Error::OcrFailed` if recomputation was needed and failed
    pub async fn load_page(&self, project: &str, page_index: usize) -> Result<LoadOutcome, Error> {
        let key: PageKey = (project.to_string(), page_index);
        *self.target.lock().await = Some(key.clone());
        tracing::debug!(project, page_index, "page requested");

        let page = self.resolve(&key).await?;

        if self.target.lock().await.as_ref() != Some(&key) {
            tracing::debug!(project, page_index, "page request superseded");
            return Ok(LoadOutcome::Superseded { project: key.0, page_index });
        }
        self.cache.snapshots.save(project, page_index).await;
        Ok(LoadOutcome::Ready(Box::new(page)))
    }

    async fn resolve(&self, key: &PageKey) -> Result<LoadedPage, Error> {
        let (project, page_index) = (key.0.as_str(), key.1);
        let page = self.cache.catalog.resolve_page(project, page_index).await?;
        let ground_truth = self
            .cache
            .catalog
            .ground_truth(project)
            .await
            .lookup(page.image_name())
            .map(str::to_string);

        let ready = |status: PageStatus, artifact: Artifact| LoadedPage {
            project: project.to_string(),
            page_index,
            status,
            payload: artifact.page,
            metadata: artifact.metadata,
            ground_truth: ground_truth.clone(),
            image_path: page.image_path.clone(),
        };

        if let Some(artifact) = self.cache.read_labeled(project, page_index).await? {
            return Ok(ready(PageStatus::Labeled, artifact));
        }

        let identity = self.cache.identity().await;
        let fingerprint = self.cache.fingerprint(&page, &identity).await?;

        if let Some(artifact) = self.cache.read_cached(project, page_index, &fingerprint).await {
            self.raw.remove(key).await;
            return Ok(ready(PageStatus::Cached, artifact));
        }

        if let Some(job) = self.raw.get(key).await
            && job.fingerprint == fingerprint
        {
            tracing::debug!(project, page_index, "serving raw page from session");
            return Ok(ready(PageStatus::Raw, job.artifact));
        }

        let job = self.cache.recompute(&page, fingerprint, &identity).await?;
        let artifact = job.artifact.clone();
        self.raw.insert(job.clone()).await;
        self.cache.queue.enqueue_from(job, &self.raw);
        Ok(ready(PageStatus::Raw, artifact))
    }

    /// Save an edited payload to the user-saved lane.
    ///
    /// Never skipped under contention: waits for the slot.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidInput` if the payload is not a JSON object
    /// - `Error::SourceUnavailable` if the page or its image is missing
    /// - `Error::WriteFailed` if the artifact could not be written
    pub async fn save_page(&self, project: &str, page_index: usize, payload: serde_json::Value) -> Result<(), Error> {
        let page = self.cache.catalog.resolve_page(project, page_index).await?;
        let ocr = match self.raw.get(&(project.to_string(), page_index)).await {
            Some(job) => job.artifact.metadata.provenance.ocr,
            None => OcrProvenance::from(&self.cache.identity().await),
        };
        self.cache.save(&page, payload, ocr).await
    }

    /// Remove a user-saved page.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the page was never saved.
    pub async fn delete_page(&self, project: &str, page_index: usize) -> Result<(), Error> {
        self.cache.delete_page(project, page_index).await
    }

    /// Last recorded position that still names an existing page.
    pub async fn restore_session(&self) -> Option<(String, usize)> {
        self.cache.restore_session().await
    }

    /// Record a navigation event.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for an unusable project key.
    pub async fn record_session(&self, project: &str, page_index: usize) -> Result<(), Error> {
        validate_project_key(project)?;
        *self.target.lock().await = Some((project.to_string(), page_index));
        self.cache.record_session(project, page_index).await
    }

    /// End the session: cache raw pages that are not cached yet and record
    /// the final position. Best-effort throughout.
    pub async fn close(&self) {
        let pending = self.raw.drain().await;
        let mut flushed = 0usize;
        for job in &pending {
            if self.cache.is_cached(job).await {
                continue;
            }
            if self.cache.writer.write(job).await {
                flushed += 1;
            }
        }

        if let Some((project, page_index)) = self.target.lock().await.clone() {
            self.cache.snapshots.save(&project, page_index).await;
        }
        tracing::info!(raw_pages = pending.len(), flushed, "session closed");
    }

    /// Resolve once background persistence has drained.
    pub async fn wait_idle(&self) {
        self.cache.wait_idle().await;
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;
    use super::*;
    use crate::cache::{EngineIdentity, Lane};
    use filetime::FileTime;
    use serde_json::json;

    fn ready(outcome: LoadOutcome) -> LoadedPage {
        match outcome {
            LoadOutcome::Ready(page) => *page,
            LoadOutcome::Superseded { project, page_index } => panic!("superseded: {project}#{page_index}"),
        }
    }

    async fn load(session: &Session, page_index: usize) -> LoadedPage {
        ready(session.load_page("bookA", page_index).await.unwrap())
    }

    #[tokio::test]
    async fn test_unchanged_page_is_served_from_cache() {
        let h = Harness::new();
        let session = h.session();

        let first = load(&session, 0).await;
        assert_eq!(first.status, PageStatus::Raw);
        assert_eq!(first.ground_truth.as_deref(), Some("first page text"));
        session.wait_idle().await;

        let second = load(&session, 0).await;
        assert_eq!(second.status, PageStatus::Cached);
        assert_eq!(second.payload, first.payload);
        assert_eq!(h.engine.calls(), 1);

        // a fresh session sees the same cache without recomputing
        let other = h.session();
        assert_eq!(load(&other, 0).await.status, PageStatus::Cached);
        assert_eq!(h.engine.calls(), 1);
    }

    #[tokio::test]
    async fn test_source_change_forces_recompute() {
        let h = Harness::new();
        let session = h.session();
        let image = h.image("001.png");
        filetime::set_file_mtime(&image, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();

        load(&session, 0).await;
        session.wait_idle().await;

        filetime::set_file_mtime(&image, FileTime::from_unix_time(1_700_000_500, 0)).unwrap();
        assert_eq!(load(&session, 0).await.status, PageStatus::Raw);
        assert_eq!(h.engine.calls(), 2);
        session.wait_idle().await;

        std::fs::write(&image, b"a longer replacement scan").unwrap();
        filetime::set_file_mtime(&image, FileTime::from_unix_time(1_700_000_500, 0)).unwrap();
        assert_eq!(load(&session, 0).await.status, PageStatus::Raw);
        assert_eq!(h.engine.calls(), 3);
    }

    #[tokio::test]
    async fn test_version_change_forces_recompute() {
        let h = Harness::new();
        let session = h.session();

        load(&session, 1).await;
        session.wait_idle().await;

        h.engine.set_version("1.1");
        assert_eq!(load(&session, 1).await.status, PageStatus::Raw);
        session.wait_idle().await;

        h.engine.set_library_version(Some("0.9.3"));
        assert_eq!(load(&session, 1).await.status, PageStatus::Raw);
        session.wait_idle().await;

        h.engine.set_library_version(None);
        assert_eq!(load(&session, 1).await.status, PageStatus::Raw);
        assert_eq!(h.engine.calls(), 4);
    }

    #[tokio::test]
    async fn test_save_then_load_is_labeled() {
        let h = Harness::new();
        let session = h.session();
        let edited = json!({"items": [{"text": "corrected"}]});

        let loading = {
            let cache = Arc::clone(&h.cache);
            tokio::spawn(async move { Session::new(cache).load_page("bookA", 0).await })
        };
        session.save_page("bookA", 0, edited.clone()).await.unwrap();
        loading.await.unwrap().unwrap();
        session.wait_idle().await;

        let page = load(&session, 0).await;
        assert_eq!(page.status, PageStatus::Labeled);
        assert_eq!(page.payload, edited);
        assert_eq!(page.metadata.provenance.source_lane, Lane::UserSaved);
    }

    #[tokio::test]
    async fn test_auto_cache_never_touches_saved_page() {
        let h = Harness::new();
        let session = h.session();
        let edited = json!({"items": [{"text": "human edit"}]});
        session.save_page("bookA", 0, edited.clone()).await.unwrap();

        let saved_file = h.config.labeled_dir().join("bookA").join("page_0000.json");
        let before = std::fs::read(&saved_file).unwrap();

        // simulate an auto-cache write of different content for the same page
        let page = h.cache.catalog.resolve_page("bookA", 0).await.unwrap();
        let identity = h.cache.identity().await;
        let fingerprint = h.cache.fingerprint(&page, &identity).await.unwrap();
        let mut job = h.cache.recompute(&page, fingerprint, &identity).await.unwrap();
        job.artifact.page = json!({"items": [{"text": "machine output"}]});
        assert!(h.cache.writer.write(&job).await);

        assert_eq!(std::fs::read(&saved_file).unwrap(), before);
        let loaded = load(&session, 0).await;
        assert_eq!(loaded.status, PageStatus::Labeled);
        assert_eq!(loaded.payload, edited);

        let cached = h.config.cache_dir().join("bookA").join("page_0000.json");
        assert!(cached.exists());
        assert!(!cached.starts_with(h.config.labeled_dir()));
    }

    #[tokio::test]
    async fn test_record_and_restore_session() {
        let h = Harness::new();
        let session = h.session();

        session.record_session("bookA", 2).await.unwrap();
        assert_eq!(h.session().restore_session().await, Some(("bookA".to_string(), 2)));

        std::fs::remove_file(h.config.session_file()).unwrap();
        assert_eq!(session.restore_session().await, None);

        session.record_session("bookA", 1).await.unwrap();
        std::fs::write(h.config.session_file(), b"{ torn").unwrap();
        assert_eq!(session.restore_session().await, None);
    }

    #[tokio::test]
    async fn test_engine_version_bump_and_revert() {
        let h = Harness::new();
        let session = h.session();

        load(&session, 0).await;
        session.wait_idle().await;
        assert_eq!(load(&session, 0).await.status, PageStatus::Cached);

        h.engine.set_version("1.1");
        assert_eq!(load(&session, 0).await.status, PageStatus::Raw);
        session.wait_idle().await;
        assert_eq!(load(&session, 0).await.status, PageStatus::Cached);

        h.engine.set_version("1.0");
        assert_eq!(load(&session, 0).await.status, PageStatus::Raw);
        assert_eq!(h.engine.calls(), 3);
    }

    #[tokio::test]
    async fn test_save_survives_auto_cache_attempt() {
        let h = Harness::new();
        let session = h.session();

        let raw = load(&session, 2).await;
        let edited = json!({"items": [{"text": "edited by hand"}]});
        session.save_page("bookA", 2, edited.clone()).await.unwrap();

        // flushing the raw lane is an auto-cache attempt for the same page
        session.close().await;
        session.wait_idle().await;

        let page = load(&h.session(), 2).await;
        assert_eq!(page.status, PageStatus::Labeled);
        assert_eq!(page.payload, edited);
        assert_ne!(page.payload, raw.payload);
    }

    #[tokio::test]
    async fn test_stale_result_is_superseded() {
        let h = Harness::new();
        let session = Arc::new(h.session());

        let first = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.load_page("bookA", 0).await })
        };
        tokio::task::yield_now().await;
        session.record_session("bookA", 1).await.unwrap();

        match first.await.unwrap().unwrap() {
            LoadOutcome::Superseded { project, page_index } => {
                assert_eq!((project.as_str(), page_index), ("bookA", 0));
            }
            LoadOutcome::Ready(page) => {
                // the load finished before navigation; it must have been for page 0
                assert_eq!(page.page_index, 0);
            }
        }

        // superseded work is still persisted
        session.wait_idle().await;
        assert_eq!(load(&h.session(), 0).await.status, PageStatus::Cached);
        assert_eq!(h.engine.calls(), 1);
    }

    #[tokio::test]
    async fn test_close_flushes_raw_lane() {
        let h = Harness::new();
        let mut config = h.config.clone();
        config.persist_queue_capacity = 1;
        config.persist_workers = 1;
        let cache = PageCache::new(&config, h.engine.clone()).unwrap();
        let session = Session::new(Arc::clone(&cache));

        // hold the slot so the background write is skipped
        let held = cache
            .artifacts
            .lock_slot(Lane::AutoCache, "bookA", 0)
            .await
            .unwrap();
        let page = ready(session.load_page("bookA", 0).await.unwrap());
        assert_eq!(page.status, PageStatus::Raw);
        cache.wait_idle().await;
        drop(held);

        // still raw, served from the session without recomputing
        assert_eq!(ready(session.load_page("bookA", 0).await.unwrap()).status, PageStatus::Raw);
        assert_eq!(h.engine.calls(), 1);

        session.close().await;
        assert_eq!(cache.restore_session().await, Some(("bookA".to_string(), 0)));
        assert_eq!(ready(Session::new(cache).load_page("bookA", 0).await.unwrap()).status, PageStatus::Cached);
        assert_eq!(h.engine.calls(), 1);
    }

    #[tokio::test]
    async fn test_failures_surface_to_caller() {
        let h = Harness::new();
        let session = h.session();

        assert!(matches!(session.load_page("bookA", 9).await, Err(Error::SourceUnavailable(_))));
        assert!(matches!(session.load_page("../etc", 0).await, Err(Error::InvalidInput(_))));

        h.engine.set_failing(true);
        assert!(matches!(session.load_page("bookA", 0).await, Err(Error::OcrFailed(_))));

        assert!(matches!(session.save_page("bookA", 0, json!([1, 2])).await, Err(Error::InvalidInput(_))));
        std::fs::remove_file(h.image("002.png")).unwrap();
        assert!(matches!(
            session.save_page("bookA", 2, json!({})).await,
            Err(Error::SourceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_cache_degrades_to_recompute() {
        let h = Harness::new();
        let session = h.session();
        load(&session, 0).await;
        session.wait_idle().await;
        assert_eq!(load(&session, 0).await.status, PageStatus::Cached);

        std::fs::write(h.config.cache_dir().join("bookA").join("manifest.json"), b"[{").unwrap();
        assert_eq!(load(&session, 0).await.status, PageStatus::Raw);
        session.wait_idle().await;
        assert_eq!(load(&session, 0).await.status, PageStatus::Cached);

        std::fs::write(h.config.cache_dir().join("bookA").join("page_0000.json"), b"garbage").unwrap();
        assert_eq!(load(&session, 0).await.status, PageStatus::Raw);
        assert_eq!(h.engine.calls(), 3);
    }

    #[tokio::test]
    async fn test_delete_falls_back_to_cache() {
        let h = Harness::new();
        let session = h.session();
        load(&session, 0).await;
        session.wait_idle().await;
        session.save_page("bookA", 0, json!({"items": []})).await.unwrap();
        assert_eq!(load(&session, 0).await.status, PageStatus::Labeled);

        session.delete_page("bookA", 0).await.unwrap();
        assert_eq!(load(&session, 0).await.status, PageStatus::Cached);
        assert!(matches!(session.delete_page("bookA", 0).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_saved_provenance_keeps_recognition_identity() {
        let h = Harness::new();
        let session = h.session();

        // hold the slot so the page stays in the raw lane
        let held = h
            .cache
            .artifacts
            .lock_slot(Lane::AutoCache, "bookA", 0)
            .await
            .unwrap();
        let raw = load(&session, 0).await;
        session.wait_idle().await;
        let job = session.raw.get(&("bookA".to_string(), 0)).await.unwrap();
        assert_eq!(job.fingerprint.engine_version, "1.0");

        h.engine.set_version("2.0");
        session.save_page("bookA", 0, raw.payload).await.unwrap();
        drop(held);
        let saved = load(&session, 0).await;
        assert_eq!(saved.metadata.provenance.ocr.engine_version, "1.0");
        assert_eq!(saved.metadata.source.fingerprint.unwrap().engine_version, "2.0");
    }

    #[tokio::test]
    async fn test_written_pages_leave_raw_lane() {
        let h = Harness::new();
        let session = h.session();
        for page_index in 0..3 {
            assert_eq!(load(&session, page_index).await.status, PageStatus::Raw);
        }
        session.wait_idle().await;

        for page_index in 0..3 {
            let page = h.cache.catalog.resolve_page("bookA", page_index).await.unwrap();
            let identity = h.cache.identity().await;
            let fingerprint = h.cache.fingerprint(&page, &identity).await.unwrap();
            assert!(h.cache.check_cached("bookA", page_index, &fingerprint).await.is_usable());
        }
        assert_eq!(session.raw.len().await, 0);
        assert_eq!(h.engine.calls(), 3);
    }

    #[tokio::test]
    async fn test_release_ignores_newer_computation() {
        let lane = RawLane::default();
        let h = Harness::new();
        let page = h.cache.catalog.resolve_page("bookA", 0).await.unwrap();
        let identity = h.cache.identity().await;
        let fingerprint = h.cache.fingerprint(&page, &identity).await.unwrap();
        let job = h.cache.recompute(&page, fingerprint, &identity).await.unwrap();
        lane.insert(job.clone()).await;

        let key = ("bookA".to_string(), 0);
        let older = job.fingerprint.clone().with_identity(&EngineIdentity::new("fake-ocr", "0.9"));
        assert!(!lane.release(&key, &older).await);
        assert_eq!(lane.len().await, 1);
        assert!(lane.release(&key, &job.fingerprint).await);
        assert_eq!(lane.len().await, 0);
    }
}
