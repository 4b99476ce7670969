//! list_projects tool implementation.

use super::json_result;
use folio_core::{ProjectSummary, Session};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Output from the list_projects tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListProjectsOutput {
    pub projects: Vec<ProjectSummary>,
}

/// Implementation of the list_projects tool.
pub async fn list_impl(session: &Session) -> Result<CallToolResult, McpError> {
    json_result(&ListProjectsOutput { projects: session.list_projects().await })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{output_of, session};

    #[tokio::test]
    async fn test_list_projects() {
        let (_dir, session) = session();
        let output = output_of(&list_impl(&session).await.unwrap());
        let projects: Vec<ProjectSummary> = serde_json::from_value(output["projects"].clone()).unwrap();
        assert_eq!(projects, vec![ProjectSummary { key: "bookA".into(), page_count: 2 }]);
    }
}
