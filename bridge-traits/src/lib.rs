//! # Host Bridge Traits
//!
//! Capability contracts that the chunked playback core consumes from its host.
//!
//! ## Overview
//!
//! The core owns scheduling, buffering and recovery. Everything that touches
//! the network, codecs, or audio hardware is reached through one of these
//! traits so that each platform can supply its own implementation.
//!
//! ## Traits
//!
//! ### Media
//! - [`ChunkFetcher`](fetch::ChunkFetcher) - Retrieve raw chunk bytes by locator
//! - [`ChunkDecoder`](playback::ChunkDecoder) - Decode chunk bytes into PCM
//! - [`AudioOutput`](playback::AudioOutput) - Play a decoded buffer, report completion
//!
//! ### Persistence
//! - [`ReliabilityStore`](storage::ReliabilityStore) - Optional load/save of reliability history
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Monotonic and wall-clock time source
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The runtime refuses to build a configuration when a required capability is
//! missing:
//!
//! ```ignore
//! let fetcher = builder.fetcher.ok_or_else(|| Error::CapabilityMissing {
//!     capability: "ChunkFetcher".to_string(),
//!     message: "No chunk fetcher provided. Desktop: enable desktop-shims.".to_string(),
//! })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors and keep the chunk locator in the message.

pub mod error;
pub mod fetch;
pub mod playback;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use fetch::{ChunkFetcher, RetryPolicy};
pub use playback::{AudioOutput, ChunkDecoder, CompletionCallback, DecodedBuffer, OutputHandle};
pub use storage::ReliabilityStore;
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
