//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (FOLIO_*)
//! 2. TOML config file (if FOLIO_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;
pub(crate) use validation::dirs_overlap;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (FOLIO_*)
/// 2. TOML config file (if FOLIO_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory whose immediate subdirectories are projects of page images.
    ///
    /// Set via FOLIO_PROJECTS_ROOT environment variable.
    #[serde(default = "default_projects_root")]
    pub projects_root: PathBuf,

    /// Root for all persisted page data.
    ///
    /// Set via FOLIO_DATA_ROOT environment variable.
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,

    /// Override for the user-saved lane directory (default: `<data_root>/labeled`).
    #[serde(default)]
    pub labeled_dir: Option<PathBuf>,

    /// Override for the auto-cache lane directory (default: `<data_root>/cache`).
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Override for the session snapshot file (default: `<data_root>/session.json`).
    #[serde(default)]
    pub session_file: Option<PathBuf>,

    /// Hash source image contents into fingerprints in addition to size and mtime.
    ///
    /// Set via FOLIO_CONTENT_HASH environment variable.
    #[serde(default)]
    pub content_hash: bool,

    /// Capacity of the background persistence queue.
    #[serde(default = "default_persist_queue_capacity")]
    pub persist_queue_capacity: usize,

    /// Number of background persistence workers.
    #[serde(default = "default_persist_workers")]
    pub persist_workers: usize,

    /// Base URL of the OCR service.
    ///
    /// Set via FOLIO_OCR_ENDPOINT environment variable.
    /// Required only when pages must be recomputed.
    #[serde(default)]
    pub ocr_endpoint: Option<String>,

    /// OCR request timeout in milliseconds.
    #[serde(default = "default_ocr_timeout_ms")]
    pub ocr_timeout_ms: u64,

    /// Supporting-library version to record when the OCR service does not report one.
    #[serde(default)]
    pub library_version: Option<String>,
}

fn default_projects_root() -> PathBuf {
    PathBuf::from("./projects")
}

fn default_data_root() -> PathBuf {
    PathBuf::from("./local-data")
}

fn default_persist_queue_capacity() -> usize {
    32
}

fn default_persist_workers() -> usize {
    2
}

fn default_ocr_timeout_ms() -> u64 {
    120_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            projects_root: default_projects_root(),
            data_root: default_data_root(),
            labeled_dir: None,
            cache_dir: None,
            session_file: None,
            content_hash: false,
            persist_queue_capacity: default_persist_queue_capacity(),
            persist_workers: default_persist_workers(),
            ocr_endpoint: None,
            ocr_timeout_ms: default_ocr_timeout_ms(),
            library_version: None,
        }
    }
}

impl AppConfig {
    /// Config rooted at `data_root` with everything else defaulted.
    pub fn with_roots(projects_root: impl Into<PathBuf>, data_root: impl Into<PathBuf>) -> Self {
        Self { projects_root: projects_root.into(), data_root: data_root.into(), ..Default::default() }
    }

    /// User-saved lane directory.
    pub fn labeled_dir(&self) -> PathBuf {
        self.labeled_dir
            .clone()
            .unwrap_or_else(|| self.data_root.join("labeled"))
    }

    /// Auto-cache lane directory.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.data_root.join("cache"))
    }

    /// Session snapshot file.
    pub fn session_file(&self) -> PathBuf {
        self.session_file
            .clone()
            .unwrap_or_else(|| self.data_root.join("session.json"))
    }

    /// OCR timeout as Duration for use with reqwest/tokio.
    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_millis(self.ocr_timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `FOLIO_`
    /// 2. TOML file from `FOLIO_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("FOLIO_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("FOLIO_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Check that an OCR endpoint is configured (for deferred validation).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the endpoint is not set.
    pub fn require_ocr_endpoint(&self) -> Result<&str, ConfigError> {
        self.ocr_endpoint.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "ocr_endpoint".into(),
            hint: "Set FOLIO_OCR_ENDPOINT environment variable".into(),
        })
    }
}
