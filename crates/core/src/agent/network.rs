//! Abstract network capability.
//!
//! The agent never talks to a transport directly; it is handed a `Network`
//! so tests can script responses and the binary can plug in an HTTP client.

use super::request::{AgentRequest, AgentResponse};
use crate::Error;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Performs one network fetch.
///
/// `Err` means the transport failed (unreachable, reset, timed out) and must be
/// `Error::Transport`. Any HTTP status, including 4xx/5xx, is an `Ok` response.
/// Implementations return only fully-received bodies.
#[async_trait::async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &AgentRequest) -> Result<AgentResponse, Error>;
}

/// Fetch every request with at most `concurrency` in flight, all-or-nothing.
///
/// Results come back in input order. The first transport failure or
/// non-success status aborts the remaining fetches and is returned.
pub async fn fetch_all(
    network: Arc<dyn Network>, requests: Vec<AgentRequest>, concurrency: usize,
) -> Result<Vec<(AgentRequest, AgentResponse)>, Error> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut join_set = JoinSet::new();

    for (index, request) in requests.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let network = network.clone();
        join_set.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| Error::Transport(e.to_string()))?;
            let response = network.fetch(&request).await?;
            if !response.is_success() {
                return Err(Error::Transport(format!("{} returned status {}", request.url, response.status)));
            }
            Ok::<_, Error>((index, request, response))
        });
    }

    let mut fetched = Vec::with_capacity(join_set.len());
    while let Some(joined) = join_set.join_next().await {
        let outcome = joined.map_err(|e| Error::Transport(format!("fetch task failed: {e}")));
        match outcome.and_then(|result| result) {
            Ok(item) => fetched.push(item),
            Err(e) => {
                join_set.shutdown().await;
                return Err(e);
            }
        }
    }

    fetched.sort_by_key(|(index, _, _)| *index);
    Ok(fetched
        .into_iter()
        .map(|(_, request, response)| (request, response))
        .collect())
}
