//! Playback lifecycle states and the published session snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Scheduler lifecycle.
///
/// ```text
/// Idle ──play──> Playing <──pause/play──> Paused
///                  │  ^
///        no data / │  │ data arrived / extend
///                  v  │
///                Stalled
///
/// Playing ──last chunk ends──> Completed
/// any ──stop──> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    /// Waiting for the next chunk's data (or for a live session to grow)
    Stalled,
    Completed,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "Idle",
            PlaybackState::Playing => "Playing",
            PlaybackState::Paused => "Paused",
            PlaybackState::Stalled => "Stalled",
            PlaybackState::Completed => "Completed",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable point-in-time view of a session.
///
/// Written only by the scheduler; readers receive copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: Option<Uuid>,
    pub state: PlaybackState,
    pub current_chunk: usize,
    /// Position on the virtual timeline in seconds
    pub position: f64,
    /// Sum of nominal durations in seconds
    pub total_duration: f64,
    /// Fraction of the look-ahead window that is decoded, `0.0..=1.0`
    pub buffer_health: f64,
    pub buffered_chunks: usize,
    pub chunk_count: usize,
    pub is_live: bool,
    pub skip_count: u32,
    pub stall_count: u32,
    pub recent_failures: u32,
}

impl SessionState {
    /// Snapshot of an engine with no session loaded.
    pub fn empty() -> Self {
        Self {
            session_id: None,
            state: PlaybackState::Idle,
            current_chunk: 0,
            position: 0.0,
            total_duration: 0.0,
            buffer_health: 1.0,
            buffered_chunks: 0,
            chunk_count: 0,
            is_live: false,
            skip_count: 0,
            stall_count: 0,
            recent_failures: 0,
        }
    }

    pub fn has_session(&self) -> bool {
        self.session_id.is_some()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::empty()
    }
}
