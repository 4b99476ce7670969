//! Interface to the external OCR collaborator.

use crate::Error;
use crate::cache::EngineIdentity;
use async_trait::async_trait;
use std::path::Path;

/// Result of recognizing one page image.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutput {
    /// Engine-owned page structure. The cache never adds fields to it.
    pub page: serde_json::Value,
    /// Identity the engine reported while producing `page`, if any.
    pub reported: EngineIdentity,
}

/// An OCR engine the orchestrator can ask for fresh results.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Identity used to fingerprint pages before recognition.
    ///
    /// Must not fail; fields that cannot be determined are left `None`.
    /// Implementations that cache it must follow what [`Self::recognize`]
    /// last reported, so a replaced engine is noticed on the next request.
    async fn identity(&self) -> EngineIdentity;

    /// Recognize the page image at `image_path`.
    ///
    /// # Errors
    ///
    /// Returns `Error::OcrFailed` when the engine cannot produce a result.
    async fn recognize(&self, image_path: &Path) -> Result<OcrOutput, Error>;
}
