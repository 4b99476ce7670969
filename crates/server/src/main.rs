//! folio-mcp server entry point.
//!
//! Boots the MCP server on stdio transport. One process serves one
//! interactive session. Logging goes to stderr to avoid interfering with the
//! JSON-RPC protocol on stdout.

use anyhow::Result;
use folio_client::{HttpOcrEngine, OfflineEngine};
use folio_core::{AppConfig, OcrEngine, PageCache, Session};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

fn engine(config: &AppConfig) -> Result<Arc<dyn OcrEngine>> {
    if config.ocr_endpoint.is_none() {
        tracing::warn!("no ocr_endpoint configured; only saved and cached pages can be served");
        return Ok(Arc::new(OfflineEngine));
    }
    Ok(Arc::new(HttpOcrEngine::from_app_config(config)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        projects_root = %config.projects_root.display(),
        labeled_dir = %config.labeled_dir().display(),
        cache_dir = %config.cache_dir().display(),
        "Starting folio server on stdio transport"
    );

    let cache = PageCache::new(&config, engine(&config)?)?;
    let session = Arc::new(Session::new(cache));

    let handler = handler::FolioServer::new(Arc::clone(&session));
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    let reason = server.waiting().await?;
    tracing::info!(?reason, "transport closed");

    session.close().await;
    session.wait_idle().await;

    Ok(())
}
