//! agent_status tool implementation.

use rmcp::{ErrorData as McpError, model::*};
use tether_core::{Agent, Error};

/// Implementation of the agent_status tool.
pub async fn status_impl(agent: &Agent) -> Result<CallToolResult, McpError> {
    let status = agent.status().await?;
    let json = serde_json::to_string_pretty(&status)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize status: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{SiteNetwork, agent};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_status_before_start() {
        let agent = agent(Arc::new(SiteNetwork::new())).await;
        let result = status_impl(&agent).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_status_after_start() {
        let agent = agent(Arc::new(SiteNetwork::new())).await;
        agent.start().await.unwrap();
        let result = status_impl(&agent).await;
        assert!(result.is_ok());
    }
}
