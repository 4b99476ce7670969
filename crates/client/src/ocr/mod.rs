//! HTTP OCR service client.
//!
//! ### Protocol
//!
//! - **Recognize**: `POST <endpoint>/ocr` with the raw image bytes as the body.
//!   The response is `{page, engine: {id, version}, library_version}`.
//! - **Identity**: `GET <endpoint>/version` returns the same `engine` and
//!   `library_version` fields. It is fetched lazily and cached once it
//!   succeeds; until then the identity is reported as unknown so fingerprints
//!   bias toward recomputation. A recognition that reports a different engine
//!   replaces the cached identity.
//! - **Failures**: transport errors, timeouts, non-2xx statuses and
//!   malformed bodies all surface as `OCR_FAILED`.

pub mod error;
pub mod offline;
pub mod response;
pub mod url;

pub use error::OcrClientError;
pub use offline::OfflineEngine;
pub use response::{EngineInfo, OcrResponse, VersionResponse};

use async_trait::async_trait;
use folio_core::cache::EngineIdentity;
use folio_core::{AppConfig, OcrEngine, OcrOutput};
use reqwest::header;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default user agent.
const DEFAULT_USER_AGENT: &str = concat!("folio/", env!("CARGO_PKG_VERSION"));

/// OCR client configuration.
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Base URL of the OCR service.
    pub endpoint: String,
    /// Request timeout (default: 120s).
    pub timeout: Duration,
    /// User-agent string (default: folio/0.x).
    pub user_agent: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self { endpoint: String::new(), timeout: DEFAULT_TIMEOUT, user_agent: DEFAULT_USER_AGENT.to_string() }
    }
}

impl OcrConfig {
    /// Build from application configuration.
    ///
    /// Returns error if no endpoint is configured.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, OcrClientError> {
        let endpoint = config
            .require_ocr_endpoint()
            .map_err(|_| OcrClientError::MissingEndpoint)?;
        Ok(Self { endpoint: endpoint.to_string(), timeout: config.ocr_timeout(), ..Default::default() })
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

/// OCR engine backed by an HTTP service.
#[derive(Debug, Clone)]
pub struct HttpOcrEngine {
    http: reqwest::Client,
    base: ::url::Url,
    identity: Arc<RwLock<Option<EngineIdentity>>>,
}

impl HttpOcrEngine {
    /// Create a new engine client with the given configuration.
    pub fn new(config: OcrConfig) -> Result<Self, OcrClientError> {
        if config.endpoint.trim().is_empty() {
            return Err(OcrClientError::MissingEndpoint);
        }
        let base = url::base_url(&config.endpoint).map_err(|e| OcrClientError::InvalidEndpoint(e.to_string()))?;

        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| OcrClientError::Network(Arc::new(e)))?;

        Ok(Self { http, base, identity: Arc::new(RwLock::new(None)) })
    }

    /// Create a new engine client from application configuration.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, OcrClientError> {
        Self::new(OcrConfig::from_app_config(config)?)
    }

    pub fn base_url(&self) -> &::url::Url {
        &self.base
    }

    fn route(&self, name: &str) -> Result<::url::Url, OcrClientError> {
        url::route(&self.base, name).map_err(|e| OcrClientError::InvalidEndpoint(e.to_string()))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, OcrClientError> {
        let status = response.status();
        if !status.is_success() {
            return Err(OcrClientError::HttpError { status: status.as_u16() });
        }
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| OcrClientError::Parse(e.to_string()))
    }

    /// Query the service for its engine identity.
    pub async fn fetch_identity(&self) -> Result<EngineIdentity, OcrClientError> {
        let url = self.route("version")?;
        let response = self
            .http
            .get(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let version: VersionResponse = Self::read_json(response).await?;
        Ok(version.into())
    }

    /// Adopt the identity a recognition reported when it disagrees with the
    /// cached one. Nothing cached yet means the next lookup asks the service.
    async fn follow(&self, reported: &EngineIdentity) {
        let mut cached = self.identity.write().await;
        let Some(current) = cached.clone() else {
            return;
        };
        if !reported.differs_from(&current) {
            return;
        }
        tracing::info!(
            previous = current.engine_version.as_deref().unwrap_or("unknown"),
            engine_version = reported.engine_version.as_deref().unwrap_or("unknown"),
            "OCR engine identity changed"
        );
        *cached = Some(reported.clone().or(&current));
    }

    /// Send one page image for recognition.
    pub async fn recognize_file(&self, image_path: &Path) -> Result<OcrResponse, OcrClientError> {
        let bytes = tokio::fs::read(image_path)
            .await
            .map_err(|e| OcrClientError::Image { path: image_path.display().to_string(), reason: e.to_string() })?;
        let file_name = image_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let start = Instant::now();
        let url = self.route("ocr")?;
        tracing::debug!(image = %file_name, bytes = bytes.len(), "sending page to OCR service");

        let response = self
            .http
            .post(url)
            .header(header::CONTENT_TYPE, content_type_for(image_path))
            .header(header::ACCEPT, "application/json")
            .header("X-Image-Name", file_name.as_str())
            .body(bytes)
            .send()
            .await?;
        let parsed: OcrResponse = Self::read_json(response).await?;

        if !parsed.page.is_object() {
            return Err(OcrClientError::Parse("page is not an object".into()));
        }
        tracing::debug!(image = %file_name, elapsed = ?start.elapsed(), "OCR completed");
        Ok(parsed)
    }
}

#[async_trait]
impl OcrEngine for HttpOcrEngine {
    async fn identity(&self) -> EngineIdentity {
        if let Some(identity) = self.identity.read().await.as_ref() {
            return identity.clone();
        }
        match self.fetch_identity().await {
            Ok(identity) => {
                tracing::info!(
                    engine_id = identity.engine_id.as_deref().unwrap_or("unknown"),
                    engine_version = identity.engine_version.as_deref().unwrap_or("unknown"),
                    "OCR engine identified"
                );
                *self.identity.write().await = Some(identity.clone());
                identity
            }
            Err(e) => {
                tracing::warn!(error = %e, "OCR engine identity unavailable");
                EngineIdentity::default()
            }
        }
    }

    async fn recognize(&self, image_path: &Path) -> Result<OcrOutput, folio_core::Error> {
        let response = self.recognize_file(image_path).await?;
        let reported = response.reported();
        self.follow(&reported).await;
        Ok(OcrOutput { page: response.page, reported })
    }
}
