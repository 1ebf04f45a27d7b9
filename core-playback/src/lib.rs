//! # Continuous Chunked Playback
//!
//! Plays an ordered list of independently fetched media chunks as one
//! continuous, seekable stream.
//!
//! ## Overview
//!
//! This crate handles:
//! - A virtual timeline mapping stream time onto chunk index and offset
//! - Look-ahead fetch+decode with coalescing and bounded memory
//! - Per-chunk reliability scoring, optionally persisted across sessions
//! - Gapless chunk transitions, stall detection and chunk skipping
//! - Pluggable buffering strategies
//! - Audio decoding using symphonia (optional, feature-gated)
//!
//! ## Architecture
//!
//! ```text
//! PlaybackEngine ──commands──> Scheduler ──> AudioOutput
//!                                  │
//!                     BufferingStrategy decides
//!                                  v
//!                            BufferManager ──> ChunkFetcher + ChunkDecoder
//! ```
//!
//! The scheduler task is the only writer of session state. Hosts read it
//! through [`SessionState`] snapshots and the event bus.

pub mod behavior;
pub mod buffer;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod reliability;
pub mod state;
pub mod strategy;
pub mod timeline;

mod scheduler;

#[cfg(feature = "core-decoder")]
pub mod decoder;

pub use behavior::{BehaviorTracker, ListeningBehavior};
pub use buffer::{BufferManager, BufferedChunk};
pub use config::{EngineConfig, ReliabilityConfig};
pub use descriptor::{ChunkDescriptor, DescriptorTable};
pub use engine::PlaybackEngine;
pub use error::{PlaybackError, Result, Stage};
pub use reliability::{ReliabilitySnapshot, ReliabilityTracker};
pub use state::{PlaybackState, SessionState};
pub use strategy::{
    BufferingDecision, BufferingStrategy, HeuristicStrategy, PatternAwareStrategy, RepairMode,
    SessionHistory, StrategyContext,
};
pub use timeline::{TimelineEntry, TimelinePosition, VirtualTimeline};

#[cfg(feature = "core-decoder")]
pub use decoder::SymphoniaChunkDecoder;
