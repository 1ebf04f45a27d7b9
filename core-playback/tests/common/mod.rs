#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::TimedAudioOutput;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{
    AudioOutput, ChunkDecoder, ChunkFetcher, CompletionCallback, DecodedBuffer, OutputHandle,
    ReliabilityStore, SystemClock,
};
use bytes::Bytes;
use core_playback::ChunkDescriptor;
use core_runtime::events::{CoreEvent, EventStream, PlaybackEvent};
use core_runtime::CoreConfig;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Fetcher whose chunk bytes are the chunk duration in seconds, as text.
///
/// Locators listed as failing always return HTTP 503.
#[derive(Default)]
pub struct SecondsFetcher {
    durations: HashMap<String, f64>,
    failing: HashSet<String>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Duration,
}

impl SecondsFetcher {
    pub fn new(descriptors: &[ChunkDescriptor]) -> Self {
        Self {
            durations: descriptors
                .iter()
                .map(|d| (d.locator.clone(), d.nominal_duration))
                .collect(),
            ..Self::default()
        }
    }

    pub fn failing(mut self, locator: &str) -> Self {
        self.failing.insert(locator.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_duration(mut self, locator: &str, secs: f64) -> Self {
        self.durations.insert(locator.to_string(), secs);
        self
    }

    pub fn calls(&self, locator: &str) -> usize {
        self.calls.lock().get(locator).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ChunkFetcher for SecondsFetcher {
    async fn fetch(&self, locator: &str) -> BridgeResult<Bytes> {
        *self.calls.lock().entry(locator.to_string()).or_default() += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.failing.contains(locator) {
            return Err(BridgeError::HttpStatus {
                status: 503,
                locator: locator.to_string(),
            });
        }
        let secs = self
            .durations
            .get(locator)
            .ok_or_else(|| BridgeError::OperationFailed(format!("unknown locator {}", locator)))?;
        Ok(Bytes::from(secs.to_string()))
    }
}

/// Decodes the text written by [`SecondsFetcher`] into a timing-only buffer.
pub struct SecondsDecoder;

#[async_trait]
impl ChunkDecoder for SecondsDecoder {
    async fn decode(&self, bytes: Bytes) -> BridgeResult<DecodedBuffer> {
        let text =
            std::str::from_utf8(&bytes).map_err(|e| BridgeError::InvalidData(e.to_string()))?;
        let secs: f64 = text
            .parse()
            .map_err(|_| BridgeError::InvalidData(format!("not a duration: {}", text)))?;
        Ok(DecodedBuffer::timing_only(Duration::from_secs_f64(secs)))
    }
}

/// Output whose position advances only when the test says so.
///
/// Never completes on its own.
#[derive(Clone, Default)]
pub struct ManualOutput {
    progress_ms: Arc<AtomicU64>,
    started: Arc<AtomicU64>,
}

impl ManualOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.progress_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of `play_buffer` calls so far
    pub fn starts(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }
}

struct ManualHandle {
    offset: Duration,
    base_ms: u64,
    progress_ms: Arc<AtomicU64>,
    stopped_at: Option<Duration>,
}

impl OutputHandle for ManualHandle {
    fn stop(&mut self) {
        if self.stopped_at.is_none() {
            self.stopped_at = Some(self.position());
        }
    }

    fn position(&self) -> Duration {
        self.stopped_at.unwrap_or_else(|| {
            let progressed = self.progress_ms.load(Ordering::SeqCst) - self.base_ms;
            self.offset + Duration::from_millis(progressed)
        })
    }
}

impl AudioOutput for ManualOutput {
    fn play_buffer(
        &self,
        _buffer: Arc<DecodedBuffer>,
        start_offset: Duration,
        _on_complete: CompletionCallback,
    ) -> BridgeResult<Box<dyn OutputHandle>> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ManualHandle {
            offset: start_offset,
            base_ms: self.progress_ms.load(Ordering::SeqCst),
            progress_ms: Arc::clone(&self.progress_ms),
            stopped_at: None,
        }))
    }
}

pub fn descriptors(durations: &[f64]) -> Vec<ChunkDescriptor> {
    let last = durations.len().saturating_sub(1);
    durations
        .iter()
        .enumerate()
        .map(|(i, secs)| {
            let descriptor =
                ChunkDescriptor::new(format!("chunk-{}", i), format!("mem://{}", i), i, *secs);
            if i == last {
                descriptor.final_chunk()
            } else {
                descriptor
            }
        })
        .collect()
}

/// Chunks without a final marker, so the session stays live.
pub fn live_descriptors(start: usize, durations: &[f64]) -> Vec<ChunkDescriptor> {
    durations
        .iter()
        .enumerate()
        .map(|(i, secs)| {
            let seq = start + i;
            ChunkDescriptor::new(format!("chunk-{}", seq), format!("mem://{}", seq), seq, *secs)
        })
        .collect()
}

/// Output that plays 60 s of audio in 60 ms.
pub fn fast_output() -> Arc<dyn AudioOutput> {
    Arc::new(TimedAudioOutput::with_speed(1000.0))
}

pub fn core_config(
    fetcher: Arc<dyn ChunkFetcher>,
    output: Arc<dyn AudioOutput>,
    store: Option<Arc<dyn ReliabilityStore>>,
) -> CoreConfig {
    CoreConfig {
        fetcher,
        decoder: Arc::new(SecondsDecoder),
        output,
        clock: Arc::new(SystemClock::new()),
        reliability_store: store,
        event_buffer_size: 1024,
    }
}

/// Receive events until one matches `done`, returning all of them.
pub async fn collect_until<F>(events: &mut EventStream, mut done: F) -> Vec<CoreEvent>
where
    F: FnMut(&CoreEvent) -> bool,
{
    let mut seen = Vec::new();
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let finished = done(&event);
                    seen.push(event);
                    if finished {
                        return;
                    }
                }
                Err(e) => panic!("event stream failed: {}", e),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), wait)
        .await
        .expect("timed out waiting for event");
    seen
}

pub fn is_completed(event: &CoreEvent) -> bool {
    matches!(event, CoreEvent::Playback(PlaybackEvent::Completed { .. }))
}

pub fn transitions(events: &[CoreEvent]) -> Vec<(usize, usize)> {
    events
        .iter()
        .filter_map(|event| match event {
            CoreEvent::Playback(PlaybackEvent::ChunkTransition { from, to }) => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

pub fn skipped(events: &[CoreEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|event| match event {
            CoreEvent::Playback(PlaybackEvent::ChunkSkipped { index, .. }) => Some(*index),
            _ => None,
        })
        .collect()
}
