//! Client code for folio.
//!
//! This crate provides the HTTP client for the external OCR service and
//! adapts it to the core `OcrEngine` trait.

pub mod ocr;

pub use ocr::{HttpOcrEngine, OcrClientError, OcrConfig, OfflineEngine};
