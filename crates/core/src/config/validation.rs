//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use std::path::{Component, Path, PathBuf};

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `persist_queue_capacity` is 0 or exceeds 1024
    /// - `persist_workers` is 0 or exceeds 16
    /// - `ocr_timeout_ms` is less than 1s or exceeds 10 minutes
    /// - `ocr_endpoint` is set but is not an http(s) URL
    /// - the labeled and cache directories overlap
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.persist_queue_capacity == 0 || self.persist_queue_capacity > 1024 {
            return Err(ConfigError::Invalid {
                field: "persist_queue_capacity".into(),
                reason: "must be between 1 and 1024".into(),
            });
        }

        if self.persist_workers == 0 || self.persist_workers > 16 {
            return Err(ConfigError::Invalid {
                field: "persist_workers".into(),
                reason: "must be between 1 and 16".into(),
            });
        }

        if self.ocr_timeout_ms < 1_000 {
            return Err(ConfigError::Invalid { field: "ocr_timeout_ms".into(), reason: "must be at least 1000ms".into() });
        }
        if self.ocr_timeout_ms > 600_000 {
            return Err(ConfigError::Invalid {
                field: "ocr_timeout_ms".into(),
                reason: "must not exceed 10 minutes (600000ms)".into(),
            });
        }

        if let Some(endpoint) = &self.ocr_endpoint {
            match url::Url::parse(endpoint) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(url) => {
                    return Err(ConfigError::Invalid {
                        field: "ocr_endpoint".into(),
                        reason: format!("unsupported scheme: {}", url.scheme()),
                    });
                }
                Err(e) => {
                    return Err(ConfigError::Invalid { field: "ocr_endpoint".into(), reason: e.to_string() });
                }
            }
        }

        if dirs_overlap(&self.labeled_dir(), &self.cache_dir()) {
            return Err(ConfigError::Invalid {
                field: "cache_dir".into(),
                reason: "labeled and cache directories must not overlap".into(),
            });
        }

        if self.content_hash {
            tracing::debug!("content hashing enabled; fingerprints will read full source images");
        }

        Ok(())
    }
}

/// Lexically normalize a path: drop `.` components and fold `..` where possible.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// True when either directory equals or contains the other.
pub(crate) fn dirs_overlap(a: &Path, b: &Path) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    a.starts_with(&b) || b.starts_with(&a)
}
