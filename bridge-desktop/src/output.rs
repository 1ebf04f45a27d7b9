//! Clock-driven audio output for headless hosts

use bridge_traits::{
    error::{BridgeError, Result},
    playback::{AudioOutput, CompletionCallback, DecodedBuffer, OutputHandle},
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

/// Audio output that "plays" a buffer by waiting out its duration.
///
/// No samples reach a device. Position advances with wall time scaled by
/// `speed`, and completion fires when the remaining duration has elapsed.
/// Useful for servers, CI, and driving the engine without audio hardware.
#[derive(Debug, Clone)]
pub struct TimedAudioOutput {
    speed: f64,
}

impl TimedAudioOutput {
    pub fn new() -> Self {
        Self { speed: 1.0 }
    }

    /// Play `speed` seconds of audio per wall-clock second.
    pub fn with_speed(speed: f64) -> Self {
        let speed = if speed.is_finite() && speed > 0.0 {
            speed
        } else {
            1.0
        };
        Self { speed }
    }
}

impl Default for TimedAudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for TimedAudioOutput {
    fn play_buffer(
        &self,
        buffer: Arc<DecodedBuffer>,
        start_offset: Duration,
        on_complete: CompletionCallback,
    ) -> Result<Box<dyn OutputHandle>> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            BridgeError::NotAvailable(format!("TimedAudioOutput requires a Tokio runtime: {}", e))
        })?;

        let total = buffer.duration;
        let offset = start_offset.min(total);
        let remaining = (total - offset).div_f64(self.speed);
        let stopped = Arc::new(AtomicBool::new(false));

        debug!(
            offset_ms = offset.as_millis() as u64,
            remaining_ms = remaining.as_millis() as u64,
            "Starting timed playback"
        );

        let task_stopped = Arc::clone(&stopped);
        let task = runtime.spawn(async move {
            sleep(remaining).await;
            if !task_stopped.load(Ordering::SeqCst) {
                on_complete();
            }
        });

        Ok(Box::new(TimedHandle {
            started: Instant::now(),
            offset,
            total,
            speed: self.speed,
            stopped,
            frozen_at: None,
            task: Some(task),
        }))
    }
}

struct TimedHandle {
    started: Instant,
    offset: Duration,
    total: Duration,
    speed: f64,
    stopped: Arc<AtomicBool>,
    frozen_at: Option<Duration>,
    task: Option<JoinHandle<()>>,
}

impl TimedHandle {
    fn live_position(&self) -> Duration {
        (self.offset + self.started.elapsed().mul_f64(self.speed)).min(self.total)
    }
}

impl OutputHandle for TimedHandle {
    fn stop(&mut self) {
        if self.frozen_at.is_some() {
            return;
        }
        self.stopped.store(true, Ordering::SeqCst);
        self.frozen_at = Some(self.live_position());
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn position(&self) -> Duration {
        self.frozen_at.unwrap_or_else(|| self.live_position())
    }
}

impl Drop for TimedHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
