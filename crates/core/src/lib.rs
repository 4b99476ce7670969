//! Core types and shared functionality for folio.
//!
//! This crate provides:
//! - The page-artifact cache (fingerprints, manifests, lanes, snapshots)
//! - The cache orchestrator and per-connection sessions
//! - Project discovery and ground truth
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod project;

pub use config::{AppConfig, ConfigError};
pub use engine::{OcrEngine, OcrOutput};
pub use error::Error;
pub use orchestrator::{LoadOutcome, LoadedPage, PageCache, PageStatus, Session};
pub use project::{ProjectCatalog, ProjectSummary};
