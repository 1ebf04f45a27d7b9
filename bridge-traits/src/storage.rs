//! Optional persistence hook for reliability history.

use async_trait::async_trait;

use crate::error::Result;

/// Key-value persistence for reliability snapshots.
///
/// Keys identify a chunk source (for example a digest of the chunk ids) and
/// values are opaque serialized snapshots. The engine works without a store;
/// every method failing is tolerated and only logged.
#[async_trait]
pub trait ReliabilityStore: Send + Sync {
    /// Load the snapshot stored under `source_key`, if any.
    async fn load(&self, source_key: &str) -> Result<Option<String>>;

    /// Store `payload` under `source_key`, replacing any previous value.
    async fn save(&self, source_key: &str, payload: &str) -> Result<()>;

    /// Remove the snapshot stored under `source_key`.
    async fn remove(&self, source_key: &str) -> Result<()>;
}
