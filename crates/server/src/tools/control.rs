//! control tool implementation.
//!
//! Delivers one message on the agent's control channel and returns the reply.

use rmcp::{ErrorData as McpError, model::*};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_core::{Agent, ControlRequest, Error};

/// Input parameters for control tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ControlParams {
    /// Correlation id echoed back in the reply.
    #[serde(default)]
    pub id: u64,

    /// Message object, e.g. `{"type": "GET_VERSION"}` or
    /// `{"type": "CACHE_URLS", "payload": {"urls": ["/menu.html"]}}`.
    pub message: Value,
}

/// Implementation of the control tool.
///
/// SKIP_WAITING produces no reply; the tool then returns `{"reply": null}`.
pub async fn control_impl(agent: &Agent, params: ControlParams) -> Result<CallToolResult, McpError> {
    let reply = agent
        .message(ControlRequest { id: params.id, message: params.message })
        .await;

    let json = match reply {
        Some(reply) => serde_json::to_string_pretty(&reply),
        None => serde_json::to_string_pretty(&serde_json::json!({ "reply": null })),
    }
    .map_err(|e| Error::InvalidInput(format!("Failed to serialize reply: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{SiteNetwork, agent};
    use serde_json::json;
    use std::sync::Arc;

    fn text(result: &CallToolResult) -> String {
        let value = serde_json::to_value(result).unwrap();
        value["content"][0]["text"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_control_get_version() {
        let agent = agent(Arc::new(SiteNetwork::new())).await;
        agent.start().await.unwrap();

        let result = control_impl(&agent, ControlParams { id: 4, message: json!({"type": "GET_VERSION"}) })
            .await
            .unwrap();

        let reply: Value = serde_json::from_str(&text(&result)).unwrap();
        assert_eq!(reply, json!({"id": 4, "response": {"type": "VERSION", "version": "v1"}}));
    }

    #[tokio::test]
    async fn test_control_skip_waiting_has_null_reply() {
        let agent = agent(Arc::new(SiteNetwork::new())).await;

        let result = control_impl(&agent, ControlParams { id: 1, message: json!({"type": "SKIP_WAITING"}) })
            .await
            .unwrap();

        let reply: Value = serde_json::from_str(&text(&result)).unwrap();
        assert_eq!(reply, json!({"reply": null}));
    }

    #[tokio::test]
    async fn test_control_unknown_message() {
        let agent = agent(Arc::new(SiteNetwork::new())).await;

        let result = control_impl(&agent, ControlParams { id: 2, message: json!({"type": "NOPE"}) })
            .await
            .unwrap();

        let reply: Value = serde_json::from_str(&text(&result)).unwrap();
        assert_eq!(reply["response"]["success"], json!(false));
    }
}
