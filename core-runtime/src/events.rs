//! # Event Bus System
//!
//! Event-driven notifications for the playback core using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: [`CoreEvent`] wraps per-domain enums ([`PlaybackEvent`], [`BufferEvent`])
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ```text
//! ┌────────────┐  emit   ┌───────────┐  subscribe  ┌────────────┐
//! │ Scheduler  ├────────>│           ├────────────>│  Host UI   │
//! └────────────┘         │ EventBus  │             └────────────┘
//! ┌────────────┐  emit   │           │  subscribe  ┌────────────┐
//! │ BufferMgr  ├────────>│           ├────────────>│ Telemetry  │
//! └────────────┘         └───────────┘             └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(64);
//! let mut stream = bus.subscribe();
//!
//! bus.emit(CoreEvent::Playback(PlaybackEvent::ChunkTransition { from: 0, to: 1 }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert!(matches!(event, CoreEvent::Playback(PlaybackEvent::ChunkTransition { .. })));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber fell behind and missed `n` events;
//!   it can keep receiving.
//! - **`RecvError::Closed`**: every sender is gone (engine disposed).
//!
//! Emitting with no subscribers returns an error that publishers ignore with `.ok()`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Scheduler state machine events
    Playback(PlaybackEvent),
    /// Buffer manager outcomes
    Buffer(BufferEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Buffer(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Playback(PlaybackEvent::Error {
                recoverable: false, ..
            }) => EventSeverity::Error,
            CoreEvent::Playback(PlaybackEvent::Error { .. })
            | CoreEvent::Playback(PlaybackEvent::ChunkSkipped { .. })
            | CoreEvent::Playback(PlaybackEvent::StallDetected { .. })
            | CoreEvent::Buffer(BufferEvent::ChunkFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Playback(PlaybackEvent::StateChanged { .. })
            | CoreEvent::Playback(PlaybackEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Playback Events
// ============================================================================

/// Notifications from the playback scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// The scheduler moved between lifecycle states.
    StateChanged {
        previous: String,
        current: String,
        chunk_index: usize,
        position_ms: u64,
    },
    /// Playback handed off from one chunk to the next.
    ChunkTransition { from: usize, to: usize },
    /// The final chunk finished playing.
    Completed { total_duration_ms: u64 },
    /// A chunk was skipped after exhausting recovery.
    ChunkSkipped { index: usize, reason: String },
    /// The watchdog saw no progress and restarted the current chunk.
    StallDetected {
        index: usize,
        position_ms: u64,
        consecutive: u32,
    },
    /// Playback progressed again after a stall.
    StallRecovered { index: usize },
    /// A surfaced error. `kind` is a stable machine-readable string.
    Error {
        kind: String,
        message: String,
        recoverable: bool,
    },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::StateChanged { .. } => "Playback state changed",
            PlaybackEvent::ChunkTransition { .. } => "Chunk transition",
            PlaybackEvent::Completed { .. } => "Playback completed",
            PlaybackEvent::ChunkSkipped { .. } => "Chunk skipped",
            PlaybackEvent::StallDetected { .. } => "Playback stalled",
            PlaybackEvent::StallRecovered { .. } => "Playback recovered from stall",
            PlaybackEvent::Error { .. } => "Playback error",
        }
    }
}

// ============================================================================
// Buffer Events
// ============================================================================

/// Outcomes of fetch/decode work and window maintenance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum BufferEvent {
    ChunkBuffered {
        index: usize,
        decoded_duration_ms: u64,
    },
    ChunkFailed {
        index: usize,
        kind: String,
        message: String,
    },
    Evicted { below: usize, count: usize },
}

impl BufferEvent {
    fn description(&self) -> &str {
        match self {
            BufferEvent::ChunkBuffered { .. } => "Chunk buffered",
            BufferEvent::ChunkFailed { .. } => "Chunk fetch or decode failed",
            BufferEvent::Evicted { .. } => "Buffered chunks evicted",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel. Cheap to clone; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Returns the number of subscribers that received it, or an error when
    /// nobody is listening.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.sender.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Subscription handle with optional filtering.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only yield events matching `predicate`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking receive. `None` when no matching event is queued.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(from: usize, to: usize) -> CoreEvent {
        CoreEvent::Playback(PlaybackEvent::ChunkTransition { from, to })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(transition(0, 1)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        assert_eq!(bus.emit(transition(1, 2)).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), transition(1, 2));
        assert_eq!(sub2.recv().await.unwrap(), transition(1, 2));
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = bus
            .subscribe()
            .filter(|event| matches!(event, CoreEvent::Buffer(_)));

        bus.emit(transition(0, 1)).ok();
        let buffered = CoreEvent::Buffer(BufferEvent::ChunkBuffered {
            index: 2,
            decoded_duration_ms: 60_000,
        });
        bus.emit(buffered.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), buffered);
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(transition(i, i + 1)).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let terminal = CoreEvent::Playback(PlaybackEvent::Error {
            kind: "terminal".to_string(),
            message: "no further chunks".to_string(),
            recoverable: false,
        });
        let skipped = CoreEvent::Playback(PlaybackEvent::ChunkSkipped {
            index: 1,
            reason: "fetch failed twice".to_string(),
        });

        assert_eq!(terminal.severity(), EventSeverity::Error);
        assert_eq!(skipped.severity(), EventSeverity::Warning);
        assert_eq!(transition(0, 1).severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = CoreEvent::Playback(PlaybackEvent::StateChanged {
            previous: "Idle".to_string(),
            current: "Playing".to_string(),
            chunk_index: 0,
            position_ms: 0,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Playback");
        assert_eq!(json["payload"]["event"], "StateChanged");
        assert_eq!(json["payload"]["current"], "Playing");

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
