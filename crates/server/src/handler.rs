//! MCP server handler implementation.
//!
//! One handler serves one connection and owns that connection's
//! [`Session`]; tool calls are routed to the implementations in
//! [`crate::tools`].
use crate::tools::{
    DeletePageParams, LoadPageParams, RecordSessionParams, SavePageParams, page, projects, session,
};
use folio_core::Session;
use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for folio.
#[derive(Clone)]
pub struct FolioServer {
    session: Arc<Session>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
#[tool_router]
impl FolioServer {
    /// Create a new server handler around a session.
    pub fn new(session: Arc<Session>) -> Self {
        Self { session, tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Load a page for display. Returns the page payload with status raw, cached or labeled, its ground truth and source image path. Returns {superseded: true} when a newer request replaced this one."
    )]
    async fn load_page(&self, params: Parameters<LoadPageParams>) -> Result<CallToolResult, McpError> {
        page::load_impl(&self.session, params.0).await
    }

    #[tool(description = "Save an edited page payload as user-labeled. Labeled pages always take precedence over OCR output.")]
    async fn save_page(&self, params: Parameters<SavePageParams>) -> Result<CallToolResult, McpError> {
        page::save_impl(&self.session, params.0).await
    }

    #[tool(description = "Delete a user-labeled page so it falls back to cached or fresh OCR output.")]
    async fn delete_page(&self, params: Parameters<DeletePageParams>) -> Result<CallToolResult, McpError> {
        page::delete_impl(&self.session, params.0).await
    }

    #[tool(description = "Return the last recorded project and page, or null if none is usable.")]
    async fn restore_session(&self) -> Result<CallToolResult, McpError> {
        session::restore_impl(&self.session).await
    }

    #[tool(description = "Record the current project and page so the next session can resume there.")]
    async fn record_session(&self, params: Parameters<RecordSessionParams>) -> Result<CallToolResult, McpError> {
        session::record_impl(&self.session, params.0).await
    }

    #[tool(description = "List projects under the projects root with their page counts.")]
    async fn list_projects(&self) -> Result<CallToolResult, McpError> {
        projects::list_impl(&self.session).await
    }
}

impl ServerHandler for FolioServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "folio".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
