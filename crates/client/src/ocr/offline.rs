//! Engine used when no OCR service is configured.

use async_trait::async_trait;
use folio_core::cache::EngineIdentity;
use folio_core::{OcrEngine, OcrOutput};
use std::path::Path;

/// Serves saved and cached pages only; every recognition fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineEngine;

#[async_trait]
impl OcrEngine for OfflineEngine {
    async fn identity(&self) -> EngineIdentity {
        EngineIdentity::default()
    }

    async fn recognize(&self, image_path: &Path) -> Result<OcrOutput, folio_core::Error> {
        Err(folio_core::Error::OcrFailed(format!(
            "no OCR endpoint configured to recognize {}",
            image_path.display()
        )))
    }
}
