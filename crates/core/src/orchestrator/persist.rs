//! Background auto-cache persistence.
//!
//! Freshly computed pages are handed to a bounded queue drained by a small
//! pool of workers. Everything here is best-effort: a full queue drops the
//! job, a held slot lock skips it, and write failures are logged. Nothing is
//! ever reported back to the interactive path.

use super::session::RawLane;
use crate::Error;
use crate::cache::{Artifact, ArtifactStore, Fingerprint, Lane, ManifestEntry, ManifestStore};
use chrono::Utc;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, Notify, mpsc};

/// A computed page waiting to be written to the auto-cache lane.
#[derive(Debug, Clone)]
pub struct PersistJob {
    pub project: String,
    pub page_index: usize,
    /// Source image path relative to the project directory.
    pub source_image_path: String,
    pub fingerprint: Fingerprint,
    /// `image` points at the source image to copy.
    pub artifact: Artifact,
}

/// Writes jobs into the auto-cache lane and its manifest.
#[derive(Debug, Clone)]
pub struct AutoCacheWriter {
    artifacts: ArtifactStore,
    manifest: ManifestStore,
}

impl AutoCacheWriter {
    pub fn new(artifacts: ArtifactStore, manifest: ManifestStore) -> Self {
        Self { artifacts, manifest }
    }

    /// Persist one job. Returns whether it was written.
    pub async fn write(&self, job: &PersistJob) -> bool {
        match self.try_write(job).await {
            Ok(written) => written,
            Err(e) => {
                tracing::warn!(
                    project = %job.project,
                    page_index = job.page_index,
                    lane = %Lane::AutoCache,
                    error = %e,
                    "auto-cache write failed"
                );
                false
            }
        }
    }

    async fn try_write(&self, job: &PersistJob) -> Result<bool, Error> {
        let Some(slot) = self
            .artifacts
            .try_lock_slot(Lane::AutoCache, &job.project, job.page_index)?
        else {
            tracing::debug!(
                project = %job.project,
                page_index = job.page_index,
                "auto-cache slot busy; skipping write"
            );
            return Ok(false);
        };

        let files = self.artifacts.write(&slot, &job.artifact).await?;
        let entry = ManifestEntry {
            page_index: job.page_index,
            source_image_path: job.source_image_path.clone(),
            fingerprint: job.fingerprint.clone(),
            artifact_files: files,
            lane: Lane::AutoCache,
            saved_at: Utc::now(),
        };
        self.manifest.put(&job.project, entry).await?;
        Ok(true)
    }
}

#[derive(Debug, Default)]
struct Activity {
    pending: AtomicUsize,
    idle: Notify,
}

impl Activity {
    fn finish(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

#[derive(Debug)]
struct Queued {
    job: PersistJob,
    /// Raw lane to release the page from once it is written.
    origin: Option<Weak<RawLane>>,
}

impl Queued {
    async fn written(self) {
        let Some(lane) = self.origin.and_then(|origin| origin.upgrade()) else {
            return;
        };
        let key = (self.job.project, self.job.page_index);
        lane.release(&key, &self.job.fingerprint).await;
    }
}

/// Bounded queue plus worker pool for auto-cache writes.
#[derive(Debug)]
pub struct PersistQueue {
    tx: mpsc::Sender<Queued>,
    activity: Arc<Activity>,
}

impl PersistQueue {
    /// Start `workers` tasks draining a queue of `capacity` jobs.
    ///
    /// Must be called from within a tokio runtime. Workers stop once the
    /// queue is dropped and drained.
    pub fn start(writer: AutoCacheWriter, capacity: usize, workers: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Queued>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let activity = Arc::new(Activity::default());

        for worker in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            let activity = Arc::clone(&activity);
            let writer = writer.clone();
            tokio::spawn(async move {
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(queued) = next else {
                        break;
                    };
                    if writer.write(&queued.job).await {
                        queued.written().await;
                    }
                    activity.finish();
                }
                tracing::debug!(worker, "persist worker stopped");
            });
        }

        Self { tx, activity }
    }

    /// Queue a job without waiting. Returns whether it was accepted.
    pub fn enqueue(&self, job: PersistJob) -> bool {
        self.send(Queued { job, origin: None })
    }

    /// Queue a job whose page is held in `origin` until it is written.
    pub(crate) fn enqueue_from(&self, job: PersistJob, origin: &Arc<RawLane>) -> bool {
        self.send(Queued { job, origin: Some(Arc::downgrade(origin)) })
    }

    fn send(&self, queued: Queued) -> bool {
        self.activity.pending.fetch_add(1, Ordering::AcqRel);
        match self.tx.try_send(queued) {
            Ok(()) => true,
            Err(e) => {
                let job = match &e {
                    mpsc::error::TrySendError::Full(queued) | mpsc::error::TrySendError::Closed(queued) => &queued.job,
                };
                tracing::debug!(
                    project = %job.project,
                    page_index = job.page_index,
                    reason = %e,
                    "auto-cache job dropped"
                );
                self.activity.finish();
                false
            }
        }
    }

    /// Resolve once no job is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let mut notified = std::pin::pin!(self.activity.idle.notified());
            notified.as_mut().enable();
            if self.activity.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}
