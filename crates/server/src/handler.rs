//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the agent.
use crate::tools::{ControlParams, InterceptParams, control_impl, intercept_impl, status_impl};

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
use std::sync::Arc;
use tether_core::Agent;

/// The main MCP server handler for the tether agent.
#[derive(Clone)]
pub struct TetherServer {
    agent: Arc<Agent>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl TetherServer {
    /// Create a new server handler around a running agent.
    pub fn new(agent: Arc<Agent>) -> Self {
        Self { agent, tool_router: Self::tool_router() }
    }

    /// Route one request through the agent.
    ///
    /// The request is classified and served by its caching strategy exactly as
    /// an intercepted application request would be.
    #[tool(
        description = "Route a request through the offline agent. Returns status, headers, body and whether it came from the network, the cache, the offline page or was synthesized."
    )]
    async fn intercept(&self, params: Parameters<InterceptParams>) -> Result<CallToolResult, McpError> {
        intercept_impl(&self.agent, params.0).await
    }

    /// Send a control message (SKIP_WAITING, GET_VERSION, CLEAR_CACHE, CACHE_URLS).
    #[tool(
        description = "Send a control message to the agent: SKIP_WAITING, GET_VERSION, CLEAR_CACHE or CACHE_URLS. Returns the reply, or null for SKIP_WAITING."
    )]
    async fn control(&self, params: Parameters<ControlParams>) -> Result<CallToolResult, McpError> {
        control_impl(&self.agent, params.0).await
    }

    /// Report lifecycle state and per-generation entry counts.
    #[tool(description = "Report the agent's lifecycle state, active version and cache generations.")]
    async fn agent_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.agent).await
    }
}

impl ServerHandler for TetherServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "tether-agent".into(),
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
