//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `ChunkFetcher` using `reqwest` ([`HttpChunkFetcher`]) or `tokio::fs` ([`FileChunkFetcher`])
//! - `ReliabilityStore` using SQLite ([`SqliteReliabilityStore`])
//! - `AudioOutput` driven by Tokio timers ([`TimedAudioOutput`])
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{HttpChunkFetcher, SqliteReliabilityStore, TimedAudioOutput};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let fetcher = HttpChunkFetcher::new()?;
//!     let store = SqliteReliabilityStore::default_location().await?;
//!     let output = TimedAudioOutput::new();
//!     // Hand these to CoreConfig::builder()
//!     Ok(())
//! }
//! ```

mod fetcher;
mod output;
mod store;

pub use fetcher::{FileChunkFetcher, HttpChunkFetcher};
pub use output::TimedAudioOutput;
pub use store::SqliteReliabilityStore;
