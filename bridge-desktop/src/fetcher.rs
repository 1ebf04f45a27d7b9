//! Chunk fetchers using Reqwest and Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    fetch::{ChunkFetcher, RetryPolicy},
};
use bytes::Bytes;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Reqwest-based chunk fetcher
///
/// Issues a `GET` against the chunk locator and returns the body. Transport
/// errors, `5xx` and `429` answers are retried with the configured backoff;
/// any other non-success status fails immediately.
pub struct HttpChunkFetcher {
    client: Client,
    policy: RetryPolicy,
}

impl HttpChunkFetcher {
    /// Create a fetcher with a 30 second request timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a fetcher with a custom request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent("chunkstream/0.1.0")
            .build()
            .map_err(|e| {
                BridgeError::NotAvailable(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self::with_client(client))
    }

    /// Wrap an existing client
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn fetch_once(&self, locator: &str) -> Result<Bytes> {
        let response = self.client.get(locator).send().await.map_err(|e| {
            if e.is_timeout() {
                BridgeError::OperationFailed("Request timed out".to_string())
            } else if e.is_connect() {
                BridgeError::OperationFailed(format!("Connection failed: {}", e))
            } else {
                BridgeError::OperationFailed(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(BridgeError::HttpStatus {
                status,
                locator: locator.to_string(),
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| BridgeError::OperationFailed(e.to_string()))
    }
}

#[async_trait]
impl ChunkFetcher for HttpChunkFetcher {
    async fn fetch(&self, locator: &str) -> Result<Bytes> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(attempt, max_attempts, locator, "Fetching chunk");

            match self.fetch_once(locator).await {
                Ok(bytes) => {
                    debug!(bytes = bytes.len(), locator, "Fetched chunk");
                    return Ok(bytes);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Chunk fetch failed, retrying"
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Fetcher that resolves locators as local file paths
///
/// Accepts plain paths and `file://` URLs, optionally relative to a root
/// directory. Handy for offline playback of a chunk set already on disk.
pub struct FileChunkFetcher {
    root: Option<PathBuf>,
}

impl FileChunkFetcher {
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Resolve relative locators against `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, locator: &str) -> PathBuf {
        let path = PathBuf::from(locator.strip_prefix("file://").unwrap_or(locator));
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        }
    }
}

impl Default for FileChunkFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkFetcher for FileChunkFetcher {
    async fn fetch(&self, locator: &str) -> Result<Bytes> {
        let path = self.resolve(locator);
        let data = tokio::fs::read(&path).await.map_err(BridgeError::Io)?;
        debug!(path = ?path, bytes = data.len(), "Read chunk from disk");
        Ok(Bytes::from(data))
    }
}
