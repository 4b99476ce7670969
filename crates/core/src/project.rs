//! Project discovery and page resolution.
//!
//! A project is an immediate subdirectory of the projects root that contains
//! at least one page image. Pages are the image files sorted by name; a
//! page index is the 0-based position in that order. An optional
//! `pages.json` maps image names to ground-truth text.

use crate::Error;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Image extensions recognized as pages (compared case-insensitively).
pub const IMAGE_EXTS: &[&str] = &["png", "jpg", "jpeg"];

/// Ground-truth file inside a project directory.
pub const GROUND_TRUTH_FILE: &str = "pages.json";

/// Reject project keys that could escape a lane directory.
pub fn validate_project_key(project: &str) -> Result<(), Error> {
    if project.is_empty() {
        return Err(Error::InvalidInput("project key cannot be empty".into()));
    }
    if project == "." || project == ".." {
        return Err(Error::InvalidInput(format!("invalid project key: {project}")));
    }
    if project.contains(['/', '\\', '\0']) {
        return Err(Error::InvalidInput(format!("project key contains a path separator: {project}")));
    }
    Ok(())
}

fn is_page_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTS.iter().any(|ext| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Summary row for project listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProjectSummary {
    pub key: String,
    pub page_count: usize,
}

/// A resolved page of a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRef {
    pub project: String,
    pub page_index: usize,
    /// Absolute (or root-relative) path of the source image.
    pub image_path: PathBuf,
    /// Image path relative to the project directory.
    pub relative_path: String,
}

impl PageRef {
    /// 1-based page number used by legacy file names.
    pub fn page_number(&self) -> usize {
        self.page_index + 1
    }

    pub fn image_name(&self) -> &str {
        self.image_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.relative_path)
    }

    /// Lowercase image extension, `png` when absent.
    pub fn image_extension(&self) -> String {
        self.image_path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| "png".to_string())
    }
}

/// Read-only view over the projects root.
#[derive(Debug, Clone)]
pub struct ProjectCatalog {
    root: PathBuf,
}

impl ProjectCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List projects sorted by key. A missing root yields an empty list.
    pub async fn list_projects(&self) -> Vec<ProjectSummary> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(root = %self.root.display(), error = %e, "projects root unreadable");
                return Vec::new();
            }
        };

        let mut projects = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read projects root entry");
                    break;
                }
            };
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if !file_type.is_dir() {
                continue;
            }
            let Some(key) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if validate_project_key(&key).is_err() {
                continue;
            }
            match self.pages(&key).await {
                Ok(pages) if !pages.is_empty() => {
                    projects.push(ProjectSummary { key, page_count: pages.len() });
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(project = %key, error = %e, "skipping unreadable project"),
            }
        }

        projects.sort_by(|a, b| a.key.cmp(&b.key));
        projects
    }

    /// Page image file names of a project, sorted.
    pub async fn pages(&self, project: &str) -> Result<Vec<String>, Error> {
        validate_project_key(project)?;
        let dir = self.root.join(project);
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| Error::SourceUnavailable(format!("project {project}: {e}")))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::SourceUnavailable(format!("project {project}: {e}")))?
        {
            let path = entry.path();
            if !is_page_image(&path) {
                continue;
            }
            if let Ok(file_type) = entry.file_type().await
                && file_type.is_file()
                && let Some(name) = path.file_name().and_then(|n| n.to_str())
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Resolve a page index to its source image.
    pub async fn resolve_page(&self, project: &str, page_index: usize) -> Result<PageRef, Error> {
        let pages = self.pages(project).await?;
        let name = pages.get(page_index).ok_or_else(|| {
            Error::SourceUnavailable(format!("project {project} has no page {page_index} ({} pages)", pages.len()))
        })?;
        Ok(PageRef {
            project: project.to_string(),
            page_index,
            image_path: self.root.join(project).join(name),
            relative_path: name.clone(),
        })
    }

    /// Whether a project exists and has a page at `page_index`.
    pub async fn contains(&self, project: &str, page_index: usize) -> bool {
        matches!(self.pages(project).await, Ok(pages) if page_index < pages.len())
    }

    /// Ground-truth map for a project; missing or malformed files yield an empty map.
    pub async fn ground_truth(&self, project: &str) -> GroundTruth {
        if validate_project_key(project).is_err() {
            return GroundTruth::default();
        }
        let path = self.root.join(project).join(GROUND_TRUTH_FILE);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return GroundTruth::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read ground truth");
                return GroundTruth::default();
            }
        };
        match serde_json::from_slice::<HashMap<String, serde_json::Value>>(&bytes) {
            Ok(raw) => GroundTruth::from_raw(raw),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ground truth is not a JSON object");
                GroundTruth::default()
            }
        }
    }
}

/// Normalized ground-truth lookup table.
#[derive(Debug, Clone, Default)]
pub struct GroundTruth {
    entries: HashMap<String, String>,
}

impl GroundTruth {
    fn from_raw(raw: HashMap<String, serde_json::Value>) -> Self {
        let mut entries = HashMap::new();
        for (key, value) in raw {
            let text = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => continue,
                other => other.to_string(),
            };
            entries.entry(key.to_lowercase()).or_insert_with(|| text.clone());
            entries.insert(key, text);
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up by exact name, lowercase name, stem, then lowercase stem.
    pub fn lookup(&self, image_name: &str) -> Option<&str> {
        if image_name.is_empty() {
            return None;
        }
        let mut candidates = vec![image_name.to_string(), image_name.to_lowercase()];
        if let Some((stem, _)) = image_name.rsplit_once('.') {
            candidates.push(stem.to_string());
            candidates.push(stem.to_lowercase());
        }
        candidates
            .iter()
            .find_map(|c| self.entries.get(c))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_project(root: &Path, key: &str, files: &[&str]) {
        let dir = root.join(key);
        std::fs::create_dir_all(&dir).unwrap();
        for f in files {
            std::fs::write(dir.join(f), b"img").unwrap();
        }
    }

    #[test]
    fn test_validate_project_key() {
        assert!(validate_project_key("bookA").is_ok());
        assert!(validate_project_key("book A_01").is_ok());
        for bad in ["", ".", "..", "a/b", "a\\b", "../bookA"] {
            assert!(matches!(validate_project_key(bad), Err(Error::InvalidInput(_))), "{bad}");
        }
    }

    #[tokio::test]
    async fn test_list_projects_requires_images() {
        let dir = tempfile::tempdir().unwrap();
        make_project(dir.path(), "bookB", &["002.JPG", "001.png"]);
        make_project(dir.path(), "bookA", &["001.jpeg"]);
        make_project(dir.path(), "notes", &["readme.txt"]);
        std::fs::write(dir.path().join("stray.png"), b"img").unwrap();

        let catalog = ProjectCatalog::new(dir.path());
        let projects = catalog.list_projects().await;
        assert_eq!(
            projects,
            vec![
                ProjectSummary { key: "bookA".into(), page_count: 1 },
                ProjectSummary { key: "bookB".into(), page_count: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn test_list_projects_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = ProjectCatalog::new(dir.path().join("nope"));
        assert!(catalog.list_projects().await.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_page_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        make_project(dir.path(), "bookA", &["010.png", "002.png", "001.png"]);
        let catalog = ProjectCatalog::new(dir.path());

        let page = catalog.resolve_page("bookA", 1).await.unwrap();
        assert_eq!(page.relative_path, "002.png");
        assert_eq!(page.page_number(), 2);
        assert_eq!(page.image_extension(), "png");
        assert_eq!(page.image_path, dir.path().join("bookA").join("002.png"));

        assert!(matches!(catalog.resolve_page("bookA", 3).await, Err(Error::SourceUnavailable(_))));
        assert!(matches!(catalog.resolve_page("missing", 0).await, Err(Error::SourceUnavailable(_))));
        assert!(matches!(catalog.resolve_page("..", 0).await, Err(Error::InvalidInput(_))));
        assert!(catalog.contains("bookA", 2).await);
        assert!(!catalog.contains("bookA", 3).await);
    }

    #[tokio::test]
    async fn test_ground_truth_lookup_variants() {
        let dir = tempfile::tempdir().unwrap();
        make_project(dir.path(), "bookA", &["001.png", "Page2.PNG"]);
        std::fs::write(
            dir.path().join("bookA").join(GROUND_TRUTH_FILE),
            r#"{"001.png": "first page", "page2": "second page", "003": null, "004": 42}"#,
        )
        .unwrap();

        let gt = ProjectCatalog::new(dir.path()).ground_truth("bookA").await;
        assert_eq!(gt.lookup("001.png"), Some("first page"));
        assert_eq!(gt.lookup("Page2.PNG"), Some("second page"));
        assert_eq!(gt.lookup("004.jpg"), Some("42"));
        assert_eq!(gt.lookup("003.png"), None);
        assert_eq!(gt.lookup(""), None);
    }

    #[tokio::test]
    async fn test_ground_truth_malformed_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        make_project(dir.path(), "bookA", &["001.png"]);
        std::fs::write(dir.path().join("bookA").join(GROUND_TRUTH_FILE), "[1, 2").unwrap();

        let catalog = ProjectCatalog::new(dir.path());
        assert!(catalog.ground_truth("bookA").await.is_empty());
        assert!(catalog.ground_truth("bookB").await.is_empty());
    }
}
