//! tether-agent entry point.
//!
//! Loads configuration, opens the cache store, starts the install/activate
//! lifecycle in the background and serves the agent over MCP on stdio.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use std::sync::Arc;
use tether_client::{FetchClient, FetchConfig};
use tether_core::{Agent, AgentConfig, AgentSignal, CacheDb};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AgentConfig::load()?;
    tracing::info!(
        namespace = %config.namespace,
        version = %config.version,
        origin = %config.app_origin,
        "Starting tether agent on stdio transport"
    );

    let db = CacheDb::open(&config.db_path).await?;
    let network = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
    let agent = Arc::new(Agent::new(config, db, network).await?);

    tokio::spawn(log_signals(agent.subscribe()));
    tokio::spawn({
        let agent = agent.clone();
        async move {
            if let Err(e) = agent.start().await {
                tracing::error!(error = %e, "agent lifecycle stopped");
            }
        }
    });

    let handler = handler::TetherServer::new(agent);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}

async fn log_signals(mut signals: tokio::sync::broadcast::Receiver<AgentSignal>) {
    loop {
        match signals.recv().await {
            Ok(signal) => match serde_json::to_string(&signal) {
                Ok(json) => tracing::info!(signal = %json, "agent signal"),
                Err(e) => tracing::warn!(error = %e, "unserializable signal"),
            },
            Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "signal logger lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
