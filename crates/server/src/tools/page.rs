//! Page tools: load_page, save_page and delete_page.

use super::json_result;
use folio_core::cache::Provenance;
use folio_core::{LoadOutcome, PageStatus, Session};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the load_page tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LoadPageParams {
    /// Project key (a directory under the projects root).
    pub project: String,

    /// Zero-based page index within the project.
    pub page_index: usize,
}

/// A page ready for display.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PageView {
    pub project: String,
    pub page_index: usize,

    /// `raw`, `cached` or `labeled`.
    pub status: PageStatus,

    /// Engine-owned page structure.
    pub payload: serde_json::Value,

    /// Ground-truth text for the page, when the project has one.
    pub ground_truth: Option<String>,

    /// Absolute path of the source image.
    pub image_path: String,

    pub provenance: Provenance,
}

/// Returned when the session moved to another page before this one was ready.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SupersededView {
    pub superseded: bool,
    pub project: String,
    pub page_index: usize,
}

/// Output from the load_page tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum LoadPageOutput {
    Superseded(SupersededView),
    Ready(Box<PageView>),
}

impl From<LoadOutcome> for LoadPageOutput {
    fn from(outcome: LoadOutcome) -> Self {
        match outcome {
            LoadOutcome::Ready(page) => {
                let page = *page;
                LoadPageOutput::Ready(Box::new(PageView {
                    project: page.project,
                    page_index: page.page_index,
                    status: page.status,
                    payload: page.payload,
                    ground_truth: page.ground_truth,
                    image_path: page.image_path.display().to_string(),
                    provenance: page.metadata.provenance,
                }))
            }
            LoadOutcome::Superseded { project, page_index } => {
                LoadPageOutput::Superseded(SupersededView { superseded: true, project, page_index })
            }
        }
    }
}

/// Implementation of the load_page tool.
pub async fn load_impl(session: &Session, params: LoadPageParams) -> Result<CallToolResult, McpError> {
    let outcome = session.load_page(&params.project, params.page_index).await?;
    json_result(&LoadPageOutput::from(outcome))
}

/// Parameters for the save_page tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SavePageParams {
    pub project: String,
    pub page_index: usize,

    /// Edited page structure. Must be a JSON object.
    pub payload: serde_json::Value,
}

/// Output from the save_page tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SavePageOutput {
    pub project: String,
    pub page_index: usize,
    pub status: PageStatus,
}

/// Implementation of the save_page tool.
pub async fn save_impl(session: &Session, params: SavePageParams) -> Result<CallToolResult, McpError> {
    session
        .save_page(&params.project, params.page_index, params.payload)
        .await?;
    json_result(&SavePageOutput { project: params.project, page_index: params.page_index, status: PageStatus::Labeled })
}

/// Parameters for the delete_page tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeletePageParams {
    pub project: String,
    pub page_index: usize,
}

/// Output from the delete_page tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeletePageOutput {
    pub project: String,
    pub page_index: usize,
    pub deleted: bool,
}

/// Implementation of the delete_page tool.
pub async fn delete_impl(session: &Session, params: DeletePageParams) -> Result<CallToolResult, McpError> {
    session.delete_page(&params.project, params.page_index).await?;
    json_result(&DeletePageOutput { project: params.project, page_index: params.page_index, deleted: true })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{output_of, session};
    use serde_json::json;

    fn load(page_index: usize) -> LoadPageParams {
        LoadPageParams { project: "bookA".into(), page_index }
    }

    #[tokio::test]
    async fn test_load_page_returns_raw_then_cached() {
        let (_dir, session) = session();

        let result = load_impl(&session, load(1)).await.unwrap();
        let output = output_of(&result);
        assert_eq!(output["status"], "raw");
        assert_eq!(output["payload"], json!({"items": [{"text": "002.png"}]}));
        assert_eq!(output["ground_truth"], "second page");
        assert!(output["image_path"].as_str().unwrap().ends_with("002.png"));

        session.wait_idle().await;
        let output = output_of(&load_impl(&session, load(1)).await.unwrap());
        assert_eq!(output["status"], "cached");
        assert_eq!(output["provenance"]["saved_by"], "auto_cache");
    }

    #[tokio::test]
    async fn test_load_page_missing_page_is_error() {
        let (_dir, session) = session();
        let err = load_impl(&session, load(9)).await.unwrap_err();
        assert_eq!(err.code.0, -32001);
    }

    #[tokio::test]
    async fn test_save_then_load_is_labeled() {
        let (_dir, session) = session();
        let payload = json!({"items": [{"text": "corrected"}]});
        let params = SavePageParams { project: "bookA".into(), page_index: 0, payload: payload.clone() };

        let output = output_of(&save_impl(&session, params).await.unwrap());
        assert_eq!(output["status"], "labeled");

        let output = output_of(&load_impl(&session, load(0)).await.unwrap());
        assert_eq!(output["status"], "labeled");
        assert_eq!(output["payload"], payload);
        assert!(output["ground_truth"].is_null());
    }

    #[tokio::test]
    async fn test_save_rejects_non_object_payload() {
        let (_dir, session) = session();
        let params = SavePageParams { project: "bookA".into(), page_index: 0, payload: json!([1, 2]) };
        let err = save_impl(&session, params).await.unwrap_err();
        assert_eq!(err.code.0, -32602);
    }

    #[tokio::test]
    async fn test_delete_page() {
        let (_dir, session) = session();
        let params = DeletePageParams { project: "bookA".into(), page_index: 0 };
        let err = delete_impl(&session, params.clone()).await.unwrap_err();
        assert_eq!(err.code.0, -32007);

        let save = SavePageParams { project: "bookA".into(), page_index: 0, payload: json!({"items": []}) };
        save_impl(&session, save).await.unwrap();
        let output = output_of(&delete_impl(&session, params).await.unwrap());
        assert_eq!(output["deleted"], true);

        let output = output_of(&load_impl(&session, load(0)).await.unwrap());
        assert_ne!(output["status"], "labeled");
    }

    #[test]
    fn test_superseded_output_shape() {
        let output = LoadPageOutput::from(LoadOutcome::Superseded { project: "bookA".into(), page_index: 2 });
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value, json!({"superseded": true, "project": "bookA", "page_index": 2}));
    }
}
