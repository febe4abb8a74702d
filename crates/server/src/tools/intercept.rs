//! intercept tool implementation.
//!
//! Routes one request through the agent exactly as an intercepted
//! application request would be.

use rmcp::{ErrorData as McpError, model::*};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tether_core::{Agent, AgentRequest, Destination, Error, ResponseSource};

/// Input parameters for intercept tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InterceptParams {
    /// Absolute URL of the request.
    pub url: String,

    /// HTTP method (default: "GET").
    #[serde(default = "default_method")]
    pub method: String,

    /// What the response is for. Inferred from the URL path when omitted.
    #[serde(default)]
    pub destination: Option<Destination>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for intercept tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InterceptOutput {
    pub status: u16,
    /// Where the response came from: network, cache, offline_fallback or synthetic.
    pub source: ResponseSource,
    pub headers: Vec<(String, String)>,
    /// Body as text, absent when it is not valid UTF-8.
    pub body: Option<String>,
    pub body_bytes: usize,
}

/// Answer the request and describe the response.
pub async fn intercept(agent: &Agent, params: InterceptParams) -> Result<InterceptOutput, Error> {
    if params.url.trim().is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()));
    }

    let mut request = AgentRequest::new(&params.method, &params.url, Destination::Other)?;
    request.destination = params
        .destination
        .unwrap_or_else(|| Destination::infer(request.path()));

    let response = agent.fetch(&request).await;
    Ok(InterceptOutput {
        status: response.status,
        source: response.source,
        body: std::str::from_utf8(&response.body).ok().map(str::to_string),
        body_bytes: response.body.len(),
        headers: response.headers,
    })
}

/// Implementation of the intercept tool.
pub async fn intercept_impl(agent: &Agent, params: InterceptParams) -> Result<CallToolResult, McpError> {
    let output = intercept(agent, params).await?;
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize response: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
