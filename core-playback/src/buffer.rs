//! # Buffer Manager
//!
//! Holds decoded chunks for a bounded window around the play cursor and runs
//! the fetch+decode work that fills it.
//!
//! ## Coalescing
//!
//! Every load runs on its own spawned task and is awaited through a
//! [`Shared`] future stored in an in-flight map, so concurrent
//! [`BufferManager::ensure_buffered`] calls for one index await a single
//! fetch. A load keeps going when its callers stop waiting for it.
//!
//! ## Epochs
//!
//! `stop` and `load_session` advance an epoch. Work started under an older
//! epoch still runs to completion, but its buffer is discarded and (after a
//! session change) its outcome is not scored.
//!
//! The buffered map and the reliability scores are only ever mutated here.

use crate::config::EngineConfig;
use crate::descriptor::{ChunkDescriptor, DescriptorTable};
use crate::error::{PlaybackError, Result, Stage};
use crate::reliability::{ReliabilitySnapshot, ReliabilityTracker};
use crate::strategy::{BufferingDecision, RepairMode};
use bridge_traits::{ChunkDecoder, ChunkFetcher, Clock, DecodedBuffer};
use core_runtime::events::{BufferEvent, CoreEvent, EventBus};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// A decoded chunk ready for output.
#[derive(Debug, Clone)]
pub struct BufferedChunk {
    pub chunk_index: usize,
    pub buffer: Arc<DecodedBuffer>,
    /// Actual playable duration in seconds
    pub decoded_duration: f64,
}

type InFlight = Shared<BoxFuture<'static, Result<BufferedChunk>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Epoch {
    session: u64,
    generation: u64,
}

struct BufferState {
    epoch: Epoch,
    table: Arc<DescriptorTable>,
    buffered: BTreeMap<usize, BufferedChunk>,
    in_flight: HashMap<usize, InFlight>,
    reliability: ReliabilityTracker,
    failures: VecDeque<Duration>,
    /// Play cursor as of the last eviction
    cursor: usize,
}

struct Inner {
    fetcher: Arc<dyn ChunkFetcher>,
    decoder: Arc<dyn ChunkDecoder>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    config: EngineConfig,
    state: Mutex<BufferState>,
    tasks: Mutex<Vec<AbortHandle>>,
}

/// Cheap to clone; clones share one buffer.
#[derive(Clone)]
pub struct BufferManager {
    inner: Arc<Inner>,
}

impl BufferManager {
    pub fn new(
        fetcher: Arc<dyn ChunkFetcher>,
        decoder: Arc<dyn ChunkDecoder>,
        clock: Arc<dyn Clock>,
        events: EventBus,
        config: EngineConfig,
    ) -> Self {
        let state = BufferState {
            epoch: Epoch {
                session: 0,
                generation: 0,
            },
            table: Arc::new(DescriptorTable::default()),
            buffered: BTreeMap::new(),
            in_flight: HashMap::new(),
            reliability: ReliabilityTracker::new(config.reliability.clone()),
            failures: VecDeque::new(),
            cursor: 0,
        };

        Self {
            inner: Arc::new(Inner {
                fetcher,
                decoder,
                clock,
                events,
                config,
                state: Mutex::new(state),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Start a new session: drop all buffers and scores, discard in-flight work.
    pub fn reset_session(&self, table: DescriptorTable) {
        let mut state = self.inner.state.lock();
        state.epoch.session += 1;
        state.epoch.generation += 1;
        state.table = Arc::new(table);
        state.buffered.clear();
        state.in_flight.clear();
        state.reliability.reset();
        state.failures.clear();
        state.cursor = 0;
    }

    /// Replace the table of a live session with its extended version.
    pub fn update_table(&self, table: DescriptorTable) {
        self.inner.state.lock().table = Arc::new(table);
    }

    /// Release every buffered entry and discard in-flight results.
    ///
    /// Scores survive; the session is unchanged.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        state.epoch.generation += 1;
        state.buffered.clear();
        state.in_flight.clear();
        state.cursor = 0;
    }

    /// Abort all background work and release everything.
    pub fn shutdown(&self) {
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
        let mut state = self.inner.state.lock();
        state.epoch.session += 1;
        state.epoch.generation += 1;
        state.table = Arc::new(DescriptorTable::default());
        state.buffered.clear();
        state.in_flight.clear();
        state.failures.clear();
        state.cursor = 0;
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Return the buffered chunk, loading it if needed.
    ///
    /// Concurrent calls for the same index share one fetch+decode.
    pub async fn ensure_buffered(&self, chunk_index: usize) -> Result<BufferedChunk> {
        let load = {
            let mut state = self.inner.state.lock();
            if let Some(chunk) = state.buffered.get(&chunk_index) {
                return Ok(chunk.clone());
            }

            let existing = state.in_flight.get(&chunk_index).cloned();
            match existing {
                Some(load) => load,
                None => {
                    let descriptor = state.table.get(chunk_index).cloned().ok_or(
                        PlaybackError::ChunkIndexOutOfRange {
                            index: chunk_index,
                            len: state.table.len(),
                        },
                    )?;
                    let task =
                        tokio::spawn(self.clone().load(chunk_index, descriptor, state.epoch));
                    self.track(task.abort_handle());
                    let load = async move {
                        match task.await {
                            Ok(result) => result,
                            Err(e) if e.is_cancelled() => Err(PlaybackError::Disposed),
                            Err(e) => Err(PlaybackError::Fetch {
                                index: chunk_index,
                                message: format!("load task failed: {}", e),
                            }),
                        }
                    }
                    .boxed()
                    .shared();
                    state.in_flight.insert(chunk_index, load.clone());
                    load
                }
            }
        };

        load.await
    }

    /// Buffered entry without triggering a load.
    pub fn get(&self, chunk_index: usize) -> Option<BufferedChunk> {
        self.inner.state.lock().buffered.get(&chunk_index).cloned()
    }

    /// Queue look-ahead work described by `decision`.
    ///
    /// Never blocks and never reports errors; failures only move scores.
    pub fn buffer_ahead(&self, decision: &BufferingDecision) {
        let candidates: Vec<usize> = {
            let state = self.inner.state.lock();
            decision
                .priority_indices
                .iter()
                .copied()
                .take(decision.look_ahead_count)
                .filter(|i| *i < state.table.len())
                .filter(|i| !state.reliability.should_skip(*i))
                .filter(|i| {
                    decision.repair_mode != RepairMode::Skip
                        || !state.reliability.is_deprioritized(*i)
                })
                .filter(|i| !state.buffered.contains_key(i) && !state.in_flight.contains_key(i))
                .collect()
        };

        if candidates.is_empty() {
            return;
        }
        debug!(
            chunks = ?candidates,
            mode = ?decision.repair_mode,
            "Scheduling look-ahead buffering"
        );

        match decision.repair_mode {
            RepairMode::Background => {
                let manager = self.clone();
                let task = tokio::spawn(async move {
                    for index in candidates {
                        // outcome already scored and logged by the load
                        let _ = manager.ensure_buffered(index).await;
                    }
                });
                self.track(task.abort_handle());
            }
            RepairMode::Immediate | RepairMode::Skip => {
                for index in candidates {
                    let manager = self.clone();
                    let task = tokio::spawn(async move {
                        let _ = manager.ensure_buffered(index).await;
                    });
                    self.track(task.abort_handle());
                }
            }
        }
    }

    fn track(&self, task: AbortHandle) {
        let mut tasks = self.inner.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    async fn load(
        self,
        chunk_index: usize,
        descriptor: ChunkDescriptor,
        epoch: Epoch,
    ) -> Result<BufferedChunk> {
        let result = self.fetch_and_decode(chunk_index, &descriptor).await;

        let event = {
            let mut state = self.inner.state.lock();
            let same_session = state.epoch.session == epoch.session;
            let current = state.epoch == epoch;
            if current {
                state.in_flight.remove(&chunk_index);
            }

            match &result {
                Ok(chunk) => {
                    if same_session {
                        state.reliability.record_outcome(chunk_index, true);
                    }
                    let behind = chunk_index + self.inner.config.eviction_window < state.cursor;
                    if current && behind {
                        debug!(
                            chunk = chunk_index,
                            cursor = state.cursor,
                            "Dropping chunk that finished behind the play cursor"
                        );
                        None
                    } else if current {
                        state.buffered.insert(chunk_index, chunk.clone());
                        Some(BufferEvent::ChunkBuffered {
                            index: chunk_index,
                            decoded_duration_ms: (chunk.decoded_duration * 1000.0) as u64,
                        })
                    } else {
                        None
                    }
                }
                Err(error) => {
                    if same_session {
                        let score = state.reliability.record_outcome(chunk_index, false);
                        let now = self.inner.clock.monotonic();
                        state.failures.push_back(now);
                        warn!(
                            chunk = chunk_index,
                            score,
                            error = %error,
                            "Chunk failed to buffer"
                        );
                        Some(BufferEvent::ChunkFailed {
                            index: chunk_index,
                            kind: error.kind().to_string(),
                            message: error.to_string(),
                        })
                    } else {
                        None
                    }
                }
            }
        };

        if let Some(event) = event {
            self.inner.events.emit(CoreEvent::Buffer(event)).ok();
        }
        result
    }

    async fn fetch_and_decode(
        &self,
        chunk_index: usize,
        descriptor: &ChunkDescriptor,
    ) -> Result<BufferedChunk> {
        let config = &self.inner.config;
        debug!(chunk = chunk_index, locator = %descriptor.locator, "Fetching chunk");

        let bytes = match tokio::time::timeout(
            config.fetch_timeout(),
            self.inner.fetcher.fetch(&descriptor.locator),
        )
        .await
        {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                return Err(PlaybackError::Fetch {
                    index: chunk_index,
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(PlaybackError::Timeout {
                    index: chunk_index,
                    stage: Stage::Fetch,
                    timeout_ms: config.fetch_timeout_ms,
                })
            }
        };

        let byte_len = bytes.len();
        let buffer = match tokio::time::timeout(
            config.decode_timeout(),
            self.inner.decoder.decode(bytes),
        )
        .await
        {
            Ok(Ok(buffer)) => buffer,
            Ok(Err(e)) => {
                return Err(PlaybackError::Decode {
                    index: chunk_index,
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(PlaybackError::Timeout {
                    index: chunk_index,
                    stage: Stage::Decode,
                    timeout_ms: config.decode_timeout_ms,
                })
            }
        };

        let decoded_duration = self.inner.decoder.decoded_duration(&buffer).as_secs_f64();
        if decoded_duration <= 0.0 {
            return Err(PlaybackError::Decode {
                index: chunk_index,
                message: "decoded buffer has no playable audio".to_string(),
            });
        }

        debug!(
            chunk = chunk_index,
            bytes = byte_len,
            decoded_secs = decoded_duration,
            nominal_secs = descriptor.nominal_duration,
            "Chunk buffered"
        );

        Ok(BufferedChunk {
            chunk_index,
            buffer: Arc::new(buffer),
            decoded_duration,
        })
    }

    // ========================================================================
    // Window maintenance
    // ========================================================================

    /// Drop entries more than `eviction_window` chunks behind `below_index`.
    ///
    /// `below_index` becomes the play cursor: loads that finish further
    /// behind it are not kept.
    pub fn evict(&self, below_index: usize) -> usize {
        let mut state = self.inner.state.lock();
        state.cursor = below_index;
        let Some(cutoff) = below_index.checked_sub(self.inner.config.eviction_window) else {
            return 0;
        };

        let keep = state.buffered.split_off(&cutoff);
        let count = std::mem::replace(&mut state.buffered, keep).len();
        drop(state);

        if count > 0 {
            debug!(below = cutoff, count, "Evicted played chunks");
            self.inner
                .events
                .emit(CoreEvent::Buffer(BufferEvent::Evicted {
                    below: cutoff,
                    count,
                }))
                .ok();
        }
        count
    }

    /// Drop entries beyond `last_index`, left over from before a backward seek.
    pub fn trim_ahead(&self, last_index: usize) -> usize {
        let mut state = self.inner.state.lock();
        let dropped = state.buffered.split_off(&(last_index.saturating_add(1)));
        dropped.len()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Fraction of `[current, current + look_ahead]` that is buffered.
    pub fn buffer_health(&self, current: usize, look_ahead: usize) -> f64 {
        let state = self.inner.state.lock();
        let end = current
            .saturating_add(look_ahead)
            .min(state.table.len().saturating_sub(1));
        if state.table.is_empty() || current > end {
            return 1.0;
        }
        let window = end - current + 1;
        let buffered = state.buffered.range(current..=end).count();
        buffered as f64 / window as f64
    }

    /// Failures within the configured failure window.
    pub fn recent_failures(&self) -> u32 {
        let now = self.inner.clock.monotonic();
        let cutoff = now.saturating_sub(self.inner.config.failure_window());
        let mut state = self.inner.state.lock();
        while state.failures.front().map_or(false, |t| *t < cutoff) {
            state.failures.pop_front();
        }
        state.failures.len() as u32
    }

    pub fn is_buffered(&self, chunk_index: usize) -> bool {
        self.inner.state.lock().buffered.contains_key(&chunk_index)
    }

    pub fn buffered_indices(&self) -> Vec<usize> {
        self.inner.state.lock().buffered.keys().copied().collect()
    }

    pub fn buffered_count(&self) -> usize {
        self.inner.state.lock().buffered.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.state.lock().in_flight.len()
    }

    /// Background tasks still running.
    pub fn active_tasks(&self) -> usize {
        let mut tasks = self.inner.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.len()
    }

    // ========================================================================
    // Reliability
    // ========================================================================

    /// Point-in-time copy of the scores for strategy decisions.
    pub fn reliability(&self) -> ReliabilityTracker {
        self.inner.state.lock().reliability.clone()
    }

    pub fn score(&self, chunk_index: usize) -> f64 {
        self.inner.state.lock().reliability.score(chunk_index)
    }

    pub fn should_skip(&self, chunk_index: usize) -> bool {
        self.inner.state.lock().reliability.should_skip(chunk_index)
    }

    /// Score a failure observed after buffering, e.g. a chunk that keeps
    /// stalling in the output.
    pub fn report_playback_failure(&self, chunk_index: usize) -> f64 {
        let now = self.inner.clock.monotonic();
        let mut state = self.inner.state.lock();
        state.failures.push_back(now);
        state.reliability.record_outcome(chunk_index, false)
    }

    pub fn export_reliability(&self, source_key: &str) -> ReliabilitySnapshot {
        let updated_at_ms = self.inner.clock.unix_timestamp_millis();
        self.inner
            .state
            .lock()
            .reliability
            .export(source_key, updated_at_ms)
    }

    pub fn import_reliability(&self, snapshot: &ReliabilitySnapshot) {
        self.inner.state.lock().reliability.import(snapshot);
    }
}

impl std::fmt::Debug for BufferManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("BufferManager")
            .field("chunks", &state.table.len())
            .field("buffered", &state.buffered.len())
            .field("in_flight", &state.in_flight.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::SystemClock;
    use bytes::Bytes;
    use mockall::mock;

    mock! {
        Fetcher {}

        #[async_trait]
        impl ChunkFetcher for Fetcher {
            async fn fetch(&self, locator: &str) -> BridgeResult<Bytes>;
        }
    }

    struct SecondsDecoder;

    #[async_trait]
    impl ChunkDecoder for SecondsDecoder {
        async fn decode(&self, bytes: Bytes) -> BridgeResult<DecodedBuffer> {
            let text = std::str::from_utf8(&bytes)
                .map_err(|e| BridgeError::InvalidData(e.to_string()))?;
            let secs: f64 = text
                .parse()
                .map_err(|_| BridgeError::InvalidData(format!("not a duration: {}", text)))?;
            Ok(DecodedBuffer::timing_only(Duration::from_secs_f64(secs)))
        }
    }

    fn table(n: usize) -> DescriptorTable {
        DescriptorTable::new(
            (0..n)
                .map(|i| ChunkDescriptor::new(format!("c{}", i), format!("mem://{}", i), i, 60.0))
                .collect(),
        )
        .unwrap()
    }

    fn manager(fetcher: impl ChunkFetcher + 'static) -> BufferManager {
        BufferManager::new(
            Arc::new(fetcher),
            Arc::new(SecondsDecoder),
            Arc::new(SystemClock::new()),
            EventBus::new(32),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_cached_entry_is_not_refetched() {
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(Bytes::from_static(b"60")));

        let buffer = manager(fetcher);
        buffer.reset_session(table(3));

        let first = buffer.ensure_buffered(0).await.unwrap();
        let second = buffer.ensure_buffered(0).await.unwrap();
        assert_eq!(first.decoded_duration, 60.0);
        assert!(Arc::ptr_eq(&first.buffer, &second.buffer));
        assert!(buffer.score(0) > 0.8);
    }

    #[tokio::test]
    async fn test_failure_lowers_score_and_counts() {
        let mut fetcher = MockFetcher::new();
        fetcher.expect_fetch().returning(|locator| {
            Err(BridgeError::HttpStatus {
                status: 503,
                locator: locator.to_string(),
            })
        });

        let buffer = manager(fetcher);
        buffer.reset_session(table(3));

        let err = buffer.ensure_buffered(1).await.unwrap_err();
        assert_eq!(err.kind(), "fetch");
        assert!(buffer.score(1) < 0.8);
        assert_eq!(buffer.recent_failures(), 1);
        assert_eq!(buffer.in_flight_count(), 0);
        assert!(!buffer.is_buffered(1));
    }

    #[tokio::test]
    async fn test_unknown_index() {
        let buffer = manager(MockFetcher::new());
        buffer.reset_session(table(2));
        assert!(matches!(
            buffer.ensure_buffered(5).await,
            Err(PlaybackError::ChunkIndexOutOfRange { index: 5, len: 2 })
        ));
    }

    #[tokio::test]
    async fn test_evict_keeps_window_behind_cursor() {
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_| Ok(Bytes::from_static(b"60")));

        let buffer = manager(fetcher);
        buffer.reset_session(table(8));
        for i in 0..6 {
            buffer.ensure_buffered(i).await.unwrap();
        }

        assert_eq!(buffer.evict(1), 0);
        assert_eq!(buffer.evict(5), 3);
        assert_eq!(buffer.buffered_indices(), vec![3, 4, 5]);

        assert_eq!(buffer.trim_ahead(4), 1);
        assert_eq!(buffer.buffered_indices(), vec![3, 4]);
    }

    #[tokio::test]
    async fn test_buffer_health() {
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_| Ok(Bytes::from_static(b"60")));

        let buffer = manager(fetcher);
        buffer.reset_session(table(4));
        assert_eq!(buffer.buffer_health(0, 3), 0.0);

        buffer.ensure_buffered(0).await.unwrap();
        buffer.ensure_buffered(1).await.unwrap();
        assert_eq!(buffer.buffer_health(0, 3), 0.5);
        // window clipped to the last chunk
        assert_eq!(buffer.buffer_health(1, 5), 1.0 / 3.0);
    }

    #[tokio::test]
    async fn test_clear_keeps_scores() {
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_| Ok(Bytes::from_static(b"60")));

        let buffer = manager(fetcher);
        buffer.reset_session(table(2));
        buffer.ensure_buffered(0).await.unwrap();
        let score = buffer.score(0);

        buffer.clear();
        assert_eq!(buffer.buffered_count(), 0);
        assert_eq!(buffer.score(0), score);

        buffer.reset_session(table(2));
        assert_eq!(buffer.score(0), 0.8);
    }
}
