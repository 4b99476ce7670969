//! Last-active position snapshot.
//!
//! Written on navigation and on close, read once per session start. Neither
//! direction ever fails the caller: write errors are logged, and a missing or
//! unreadable snapshot reads as absent.

use super::atomic::write_atomic;
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SnapshotRecord {
    project: String,
    page_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    saved_at: Option<DateTime<Utc>>,
}

/// File-backed session snapshot.
#[derive(Debug, Clone)]
pub struct SessionSnapshotStore {
    path: PathBuf,
}

impl SessionSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record the active position. Failures are logged and swallowed.
    pub async fn save(&self, project: &str, page_index: usize) {
        if let Err(e) = self.try_save(project, page_index).await {
            tracing::warn!(project, page_index, error = %e, "session snapshot not saved");
        }
    }

    async fn try_save(&self, project: &str, page_index: usize) -> Result<(), Error> {
        let record = SnapshotRecord { project: project.to_string(), page_index, saved_at: Some(Utc::now()) };
        let bytes = serde_json::to_vec_pretty(&record)
            .map_err(|e| Error::WriteFailed(format!("failed to serialize session snapshot: {e}")))?;
        write_atomic(&self.path, &bytes)
            .await
            .map_err(|e| Error::WriteFailed(format!("{}: {e}", self.path.display())))
    }

    /// Last recorded position, if a readable snapshot exists.
    pub async fn load(&self) -> Option<(String, usize)> {
        match self.try_load().await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring session snapshot");
                None
            }
        }
    }

    async fn try_load(&self) -> Result<Option<(String, usize)>, Error> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::SnapshotCorrupt(e.to_string())),
        };
        let record: SnapshotRecord =
            serde_json::from_slice(&bytes).map_err(|e| Error::SnapshotCorrupt(e.to_string()))?;
        if record.project.is_empty() {
            return Err(Error::SnapshotCorrupt("empty project key".into()));
        }
        Ok(Some((record.project, record.page_index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionSnapshotStore::new(dir.path().join("data").join("session.json"));

        assert_eq!(store.load().await, None);
        store.save("bookA", 3).await;
        assert_eq!(store.load().await, Some(("bookA".to_string(), 3)));
        store.save("bookB", 0).await;
        assert_eq!(store.load().await, Some(("bookB".to_string(), 0)));
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = SessionSnapshotStore::new(&path);

        let bodies: [&[u8]; 4] = [
            b"{\"project\": \"bookA\", ",
            b"[]",
            br#"{"project": "", "page_index": 1}"#,
            br#"{"project": "bookA", "page_index": -1}"#,
        ];
        for body in bodies {
            std::fs::write(&path, body).unwrap();
            assert_eq!(store.load().await, None);
        }
    }

    #[tokio::test]
    async fn test_accepts_snapshot_without_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, br#"{"project": "bookA", "page_index": 7}"#).unwrap();
        assert_eq!(SessionSnapshotStore::new(&path).load().await, Some(("bookA".to_string(), 7)));
    }

    #[tokio::test]
    async fn test_save_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let store = SessionSnapshotStore::new(blocker.join("session.json"));

        store.save("bookA", 1).await;
        assert_eq!(store.load().await, None);
    }
}
