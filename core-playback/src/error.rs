//! # Playback Error Types
//!
//! Error taxonomy for the chunked playback engine.
//!
//! Errors are `Clone` because a single fetch/decode outcome is shared between
//! every caller awaiting the same in-flight chunk.

use thiserror::Error;

/// Pipeline stage that exceeded its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Decode,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Fetch => write!(f, "fetch"),
            Stage::Decode => write!(f, "decode"),
        }
    }
}

/// Errors that can occur during playback operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    // ========================================================================
    // Chunk Errors
    // ========================================================================
    /// Chunk bytes could not be retrieved.
    #[error("Failed to fetch chunk {index}: {message}")]
    Fetch { index: usize, message: String },

    /// Chunk bytes were retrieved but are not a playable buffer.
    #[error("Failed to decode chunk {index}: {message}")]
    Decode { index: usize, message: String },

    /// Fetch or decode did not finish in time.
    #[error("Chunk {index} {stage} timed out after {timeout_ms}ms")]
    Timeout {
        index: usize,
        stage: Stage,
        timeout_ms: u64,
    },

    // ========================================================================
    // Control Errors
    // ========================================================================
    /// Seek or lookup target lies outside the timeline.
    #[error("Time {time}s is outside the timeline [0, {total}s)")]
    OutOfRange { time: f64, total: f64 },

    /// Chunk index does not exist in the loaded session.
    #[error("Chunk index {index} out of range (session has {len} chunks)")]
    ChunkIndexOutOfRange { index: usize, len: usize },

    /// Operation is not allowed in the current state.
    #[error("Cannot {operation} while {state}")]
    InvalidState { operation: String, state: String },

    /// Descriptor list violates the table invariants.
    #[error("Invalid chunk descriptors: {0}")]
    InvalidDescriptors(String),

    /// Recovery was exhausted and no further chunk can be played.
    #[error("Playback cannot continue: {0}")]
    TerminalPlayback(String),

    // ========================================================================
    // Platform / Lifecycle Errors
    // ========================================================================
    /// The audio output refused to play a buffer.
    #[error("Audio output error: {0}")]
    Output(String),

    /// Engine configuration is invalid.
    #[error("Invalid engine configuration: {0}")]
    Config(String),

    /// The engine has been disposed.
    #[error("Playback engine disposed")]
    Disposed,
}

impl PlaybackError {
    /// Returns `true` for chunk-level failures that the scheduler recovers
    /// from by retrying or skipping.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PlaybackError::Fetch { .. }
                | PlaybackError::Decode { .. }
                | PlaybackError::Timeout { .. }
        )
    }

    /// Stable machine-readable kind carried by error events.
    pub fn kind(&self) -> &'static str {
        match self {
            PlaybackError::Fetch { .. } => "fetch",
            PlaybackError::Decode { .. } => "decode",
            PlaybackError::Timeout {
                stage: Stage::Fetch,
                ..
            } => "fetch",
            PlaybackError::Timeout {
                stage: Stage::Decode,
                ..
            } => "decode",
            PlaybackError::OutOfRange { .. } | PlaybackError::ChunkIndexOutOfRange { .. } => {
                "out_of_range"
            }
            PlaybackError::InvalidState { .. } => "invalid_state",
            PlaybackError::InvalidDescriptors(_) => "invalid_descriptors",
            PlaybackError::TerminalPlayback(_) => "terminal",
            PlaybackError::Output(_) => "output",
            PlaybackError::Config(_) => "config",
            PlaybackError::Disposed => "disposed",
        }
    }

    pub(crate) fn invalid_state(operation: &str, state: impl std::fmt::Display) -> Self {
        PlaybackError::InvalidState {
            operation: operation.to_string(),
            state: state.to_string(),
        }
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
