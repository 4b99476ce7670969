//! OCR service wire types.

use folio_core::cache::EngineIdentity;
use serde::Deserialize;

/// Engine block reported by the service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Response of `GET <endpoint>/version`.
#[derive(Debug, Deserialize)]
pub struct VersionResponse {
    #[serde(default)]
    pub engine: EngineInfo,
    #[serde(default)]
    pub library_version: Option<String>,
}

impl From<VersionResponse> for EngineIdentity {
    fn from(raw: VersionResponse) -> Self {
        identity(raw.engine, raw.library_version)
    }
}

/// Response of `POST <endpoint>/ocr`.
#[derive(Debug, Deserialize)]
pub struct OcrResponse {
    pub page: serde_json::Value,
    #[serde(default)]
    pub engine: EngineInfo,
    #[serde(default)]
    pub library_version: Option<String>,
}

impl OcrResponse {
    /// Identity the service reported alongside the page.
    pub fn reported(&self) -> EngineIdentity {
        identity(self.engine.clone(), self.library_version.clone())
    }
}

fn identity(engine: EngineInfo, library_version: Option<String>) -> EngineIdentity {
    let non_blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    EngineIdentity {
        engine_id: non_blank(engine.id),
        engine_version: non_blank(engine.version),
        library_version: non_blank(library_version),
    }
}
