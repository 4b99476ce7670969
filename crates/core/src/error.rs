//! Unified error types for folio.
//!
//! Advisory failures (auto-cache writes, manifests, session snapshots) are
//! logged and swallowed by the orchestrator; only the source-image path, the
//! OCR collaborator and explicit user saves surface these to callers.

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Unified error types for the page cache.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Source image is missing, unreadable, or the page does not exist.
    #[error("SOURCE_UNAVAILABLE: {0}")]
    SourceUnavailable(String),

    /// A manifest file could not be parsed.
    #[error("MANIFEST_CORRUPT: {0}")]
    ManifestCorrupt(String),

    /// An artifact payload could not be deserialized.
    #[error("ARTIFACT_CORRUPT: {0}")]
    ArtifactCorrupt(String),

    /// Writing to disk failed (disk full, permissions, rename).
    #[error("WRITE_FAILED: {0}")]
    WriteFailed(String),

    /// The session snapshot could not be parsed.
    #[error("SNAPSHOT_CORRUPT: {0}")]
    SnapshotCorrupt(String),

    /// Invalid input parameters (e.g., a project key with path separators).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// The external OCR collaborator failed.
    #[error("OCR_FAILED: {0}")]
    OcrFailed(String),

    /// Two lanes were configured with overlapping storage roots.
    #[error("LANE_CONFLICT: {0}")]
    LaneConflict(String),

    /// Nothing to act on (e.g., deleting a page that was never saved).
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
}

impl Error {
    /// Whether this error came from the advisory cache path and may be swallowed.
    pub fn is_advisory(&self) -> bool {
        matches!(
            self,
            Error::ManifestCorrupt(_) | Error::ArtifactCorrupt(_) | Error::SnapshotCorrupt(_)
        )
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::OcrFailed(msg) => (-32000, msg.clone()),
            Error::SourceUnavailable(msg) => (-32001, msg.clone()),
            Error::WriteFailed(msg) => (-32002, msg.clone()),
            Error::ManifestCorrupt(msg) => (-32003, msg.clone()),
            Error::ArtifactCorrupt(msg) => (-32004, msg.clone()),
            Error::SnapshotCorrupt(msg) => (-32005, msg.clone()),
            Error::LaneConflict(msg) => (-32006, msg.clone()),
            Error::NotFound(msg) => (-32007, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::SourceUnavailable("bookA/0001.png".to_string());
        assert!(err.to_string().contains("SOURCE_UNAVAILABLE"));
        assert!(err.to_string().contains("bookA/0001.png"));
    }

    #[test]
    fn test_error_to_mcp_error() {
        let err = Error::WriteFailed("disk full".to_string());
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32002);

        let err = Error::InvalidInput("bad key".to_string());
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32602);
    }

    #[test]
    fn test_advisory_classification() {
        assert!(Error::ManifestCorrupt("x".into()).is_advisory());
        assert!(Error::SnapshotCorrupt("x".into()).is_advisory());
        assert!(!Error::WriteFailed("x".into()).is_advisory());
        assert!(!Error::SourceUnavailable("x".into()).is_advisory());
    }
}
