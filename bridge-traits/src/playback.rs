//! Decode and audio output capabilities.
//!
//! The engine turns fetched chunk bytes into a [`DecodedBuffer`] through a
//! host-supplied [`ChunkDecoder`] and hands finished buffers to an
//! [`AudioOutput`]. Codecs and hardware stay on the host side of this line.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// Decoded PCM audio for a single chunk.
///
/// Samples are interleaved `f32` in `[-1.0, 1.0]`. Buffers are immutable once
/// produced; the engine shares them behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBuffer {
    /// Interleaved samples (LRLR... for stereo)
    pub samples: Vec<f32>,
    /// Sample rate in hertz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// Playable duration of the buffer
    pub duration: Duration,
}

impl DecodedBuffer {
    /// Build a buffer from interleaved samples, deriving its duration.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let frames = if channels == 0 {
            0
        } else {
            samples.len() / channels as usize
        };
        let duration = if sample_rate == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(frames as f64 / sample_rate as f64)
        };

        Self {
            samples,
            sample_rate,
            channels,
            duration,
        }
    }

    /// A buffer that carries only its duration.
    ///
    /// Used by hosts whose decoder keeps PCM in platform-native objects and
    /// only reports timing back to the core.
    pub fn timing_only(duration: Duration) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate: 0,
            channels: 0,
            duration,
        }
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

/// Decode capability.
#[async_trait]
pub trait ChunkDecoder: Send + Sync {
    /// Decode one complete chunk into a playable buffer.
    ///
    /// # Errors
    ///
    /// Returns an error when the bytes are not a valid or playable chunk.
    async fn decode(&self, bytes: Bytes) -> Result<DecodedBuffer>;

    /// Actual playable duration of a decoded buffer.
    ///
    /// May differ from the chunk's nominal duration (final chunks are often
    /// shorter).
    fn decoded_duration(&self, buffer: &DecodedBuffer) -> Duration {
        buffer.duration
    }
}

/// Invoked once when an output finishes playing a buffer to its end.
pub type CompletionCallback = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a buffer currently being played.
pub trait OutputHandle: Send + Sync {
    /// Stop playback. After this returns the completion callback must not fire.
    fn stop(&mut self);

    /// Current playback position within the buffer, including the start offset.
    fn position(&self) -> Duration;
}

/// Audio output capability.
///
/// # Example
///
/// ```ignore
/// let handle = output.play_buffer(buffer, Duration::ZERO, Box::new(move || {
///     let _ = tx.send(());
/// }))?;
/// ```
pub trait AudioOutput: Send + Sync {
    /// Begin playing `buffer` from `start_offset`.
    ///
    /// `on_complete` fires exactly once when playback reaches the end of the
    /// buffer, unless the returned handle is stopped first.
    fn play_buffer(
        &self,
        buffer: Arc<DecodedBuffer>,
        start_offset: Duration,
        on_complete: CompletionCallback,
    ) -> Result<Box<dyn OutputHandle>>;
}
