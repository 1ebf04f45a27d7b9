//! Reliability history storage using SQLite

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::ReliabilityStore,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS reliability_snapshots (
        source_key TEXT PRIMARY KEY,
        payload TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
"#;

/// SQLite-backed reliability store
///
/// One row per chunk source. Payloads are stored verbatim; the engine owns
/// their format.
pub struct SqliteReliabilityStore {
    pool: SqlitePool,
}

impl SqliteReliabilityStore {
    /// Open (or create) a store at `db_path`
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        // SQLite URLs want forward slashes
        let path_str = db_path.to_string_lossy().replace('\\', "/");
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path_str))
            .map_err(|e| BridgeError::DatabaseError(format!("Invalid database path: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to connect to DB: {}", e)))?;

        Self::init(&pool).await?;
        debug!(path = ?db_path, "Initialized reliability store");

        Ok(Self { pool })
    }

    /// Open the store in the platform data directory
    pub async fn default_location() -> Result<Self> {
        let dir = dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("chunkstream");
        Self::new(dir.join("reliability.db")).await
    }

    /// Create an in-memory store (for testing)
    pub async fn in_memory() -> Result<Self> {
        // every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to connect to DB: {}", e)))?;

        Self::init(&pool).await?;
        Ok(Self { pool })
    }

    async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(CREATE_TABLE)
            .execute(pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to create table: {}", e)))?;
        Ok(())
    }

    /// Number of stored snapshots
    pub async fn len(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) FROM reliability_snapshots")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to count rows: {}", e)))?;
        let count: i64 = row.get(0);
        Ok(count.max(0) as usize)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

#[async_trait]
impl ReliabilityStore for SqliteReliabilityStore {
    async fn load(&self, source_key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT payload FROM reliability_snapshots WHERE source_key = ?")
            .bind(source_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to load snapshot: {}", e)))?;

        let payload = row.map(|row| row.get::<String, _>(0));
        debug!(source_key, found = payload.is_some(), "Loaded reliability snapshot");
        Ok(payload)
    }

    async fn save(&self, source_key: &str, payload: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reliability_snapshots (source_key, payload, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(source_key) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(source_key)
        .bind(payload)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to save snapshot: {}", e)))?;

        debug!(source_key, bytes = payload.len(), "Stored reliability snapshot");
        Ok(())
    }

    async fn remove(&self, source_key: &str) -> Result<()> {
        sqlx::query("DELETE FROM reliability_snapshots WHERE source_key = ?")
            .bind(source_key)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                BridgeError::DatabaseError(format!("Failed to delete snapshot: {}", e))
            })?;

        debug!(source_key, "Deleted reliability snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_creation() {
        let store = SqliteReliabilityStore::in_memory().await.unwrap();
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_save_load_replace_remove() {
        let store = SqliteReliabilityStore::in_memory().await.unwrap();

        assert_eq!(store.load("abc").await.unwrap(), None);

        store.save("abc", r#"{"scores":{"1":0.4}}"#).await.unwrap();
        store.save("abc", r#"{"scores":{"1":0.6}}"#).await.unwrap();
        assert_eq!(
            store.load("abc").await.unwrap().as_deref(),
            Some(r#"{"scores":{"1":0.6}}"#)
        );
        assert_eq!(store.len().await.unwrap(), 1);

        store.remove("abc").await.unwrap();
        assert_eq!(store.load("abc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = std::env::temp_dir().join(format!("chunkstream-store-{}", std::process::id()));
        let path = dir.join("reliability.db");

        {
            let store = SqliteReliabilityStore::new(path.clone()).await.unwrap();
            store.save("source", "payload").await.unwrap();
        }

        let reopened = SqliteReliabilityStore::new(path).await.unwrap();
        assert_eq!(
            reopened.load("source").await.unwrap().as_deref(),
            Some("payload")
        );

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
