//! Chunk Retrieval Abstraction
//!
//! The playback core never speaks HTTP directly. It hands an opaque chunk
//! locator to a [`ChunkFetcher`] and receives the raw chunk bytes back.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::error::Result;

/// Retry policy applied by fetcher implementations that talk to flaky stores.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Whether to use exponential backoff
    pub use_exponential_backoff: bool,
}

impl RetryPolicy {
    /// A policy that performs exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait before the given retry (1-based: `1` is the first retry).
    pub fn delay_for(&self, retry: u32) -> Duration {
        if !self.use_exponential_backoff {
            return self.base_delay;
        }
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            use_exponential_backoff: true,
        }
    }
}

/// Fetch capability for chunk bytes.
///
/// Locators are opaque to the core: a content-addressed gateway URL, a file
/// path, or any key the host knows how to resolve.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::fetch::ChunkFetcher;
///
/// async fn first_chunk(fetcher: &dyn ChunkFetcher) -> Result<usize> {
///     let bytes = fetcher.fetch("https://gateway.example/ipfs/bafy.../0").await?;
///     Ok(bytes.len())
/// }
/// ```
#[async_trait]
pub trait ChunkFetcher: Send + Sync {
    /// Retrieve the complete byte content addressed by `locator`.
    ///
    /// # Errors
    ///
    /// Returns an error when the chunk is unavailable, the transport fails,
    /// or the store answers with a non-success status.
    async fn fetch(&self, locator: &str) -> Result<Bytes>;
}
