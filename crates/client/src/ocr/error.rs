//! OCR client error types.

use std::sync::Arc;

/// Errors from the OCR service client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OcrClientError {
    /// No OCR endpoint configured.
    #[error("missing OCR endpoint: FOLIO_OCR_ENDPOINT not set")]
    MissingEndpoint,

    /// The configured endpoint is not a usable URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The page image could not be read.
    #[error("cannot read image {path}: {reason}")]
    Image { path: String, reason: String },

    /// Non-success HTTP status.
    #[error("HTTP error: {status}")]
    HttpError { status: u16 },

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Response parse error.
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for OcrClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { OcrClientError::Timeout } else { OcrClientError::Network(Arc::new(err)) }
    }
}

impl From<OcrClientError> for folio_core::Error {
    fn from(err: OcrClientError) -> Self {
        match err {
            OcrClientError::Image { .. } => folio_core::Error::SourceUnavailable(err.to_string()),
            other => folio_core::Error::OcrFailed(other.to_string()),
        }
    }
}
