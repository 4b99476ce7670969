//! Session tools: restore_session and record_session.

use super::json_result;
use folio_core::Session;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A page position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Position {
    pub project: String,
    pub page_index: usize,
}

/// Output from the restore_session tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RestoreSessionOutput {
    /// Last recorded position, or null when there is nothing to restore.
    pub position: Option<Position>,
}

/// Implementation of the restore_session tool.
pub async fn restore_impl(session: &Session) -> Result<CallToolResult, McpError> {
    let position = session
        .restore_session()
        .await
        .map(|(project, page_index)| Position { project, page_index });
    json_result(&RestoreSessionOutput { position })
}

/// Parameters for the record_session tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RecordSessionParams {
    pub project: String,
    pub page_index: usize,
}

/// Output from the record_session tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RecordSessionOutput {
    pub recorded: Position,
}

/// Implementation of the record_session tool.
pub async fn record_impl(session: &Session, params: RecordSessionParams) -> Result<CallToolResult, McpError> {
    session
        .record_session(&params.project, params.page_index)
        .await?;
    json_result(&RecordSessionOutput {
        recorded: Position { project: params.project, page_index: params.page_index },
    })
}
