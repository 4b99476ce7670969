//! MCP tool implementations.
//!
//! This module contains all tools exposed by the folio server. Each tool is a
//! plain async function over the connection's [`Session`](folio_core::Session)
//! so it can be tested without a transport.

pub mod page;
pub mod projects;
pub mod session;

pub use page::{DeletePageParams, LoadPageParams, SavePageParams};
pub use session::RecordSessionParams;

use folio_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

/// Render a tool output as pretty JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use folio_core::cache::EngineIdentity;
    use folio_core::{AppConfig, Error, OcrEngine, OcrOutput, PageCache, Session};
    use rmcp::model::CallToolResult;
    use std::path::Path;
    use std::sync::Arc;

    /// Engine that recognizes every page as its file name.
    #[derive(Debug)]
    pub struct StubEngine;

    #[async_trait]
    impl OcrEngine for StubEngine {
        async fn identity(&self) -> EngineIdentity {
            EngineIdentity::new("stub-ocr", "1.0").with_library_version("0.1.0")
        }

        async fn recognize(&self, image_path: &Path) -> Result<OcrOutput, Error> {
            let name = image_path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            Ok(OcrOutput {
                page: serde_json::json!({"items": [{"text": name}]}),
                reported: EngineIdentity::default(),
            })
        }
    }

    /// A session over a temporary `bookA` project of two pages.
    pub fn session() -> (tempfile::TempDir, Session) {
        let dir = tempfile::tempdir().unwrap();
        let book = dir.path().join("projects").join("bookA");
        std::fs::create_dir_all(&book).unwrap();
        std::fs::write(book.join("001.png"), b"first").unwrap();
        std::fs::write(book.join("002.png"), b"second").unwrap();
        std::fs::write(book.join("pages.json"), r#"{"002.png": "second page"}"#).unwrap();

        let config = AppConfig::with_roots(dir.path().join("projects"), dir.path().join("data"));
        let cache = PageCache::new(&config, Arc::new(StubEngine)).unwrap();
        (dir, Session::new(cache))
    }

    /// Parse the JSON text of a tool result.
    pub fn output_of(result: &CallToolResult) -> serde_json::Value {
        let content_val = serde_json::to_value(&result.content[0]).unwrap();
        let text = content_val
            .get("text")
            .and_then(|v| v.as_str())
            .expect("Expected text field in content");
        serde_json::from_str(text).unwrap()
    }
}
