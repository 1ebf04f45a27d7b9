//! # Playback Scheduler
//!
//! The single writer of session state. Runs as one Tokio task and reacts to
//! four inputs:
//!
//! - commands from [`PlaybackEngine`](crate::PlaybackEngine) handles
//! - output completions, tagged with the token of the source that finished
//! - the chunk load the playback path is waiting on
//! - the stall watchdog tick
//! - buffer events, which only refresh the published snapshot
//!
//! Waiting for a chunk never blocks the loop: while the next chunk loads the
//! session is `Stalled`, and commands keep being served.

use crate::behavior::BehaviorTracker;
use crate::buffer::{BufferManager, BufferedChunk};
use crate::config::EngineConfig;
use crate::descriptor::{ChunkDescriptor, DescriptorTable};
use crate::error::{PlaybackError, Result};
use crate::reliability::ReliabilitySnapshot;
use crate::state::{PlaybackState, SessionState};
use crate::strategy::{BufferingStrategy, StrategyContext};
use crate::timeline::VirtualTimeline;
use bridge_traits::{AudioOutput, Clock, OutputHandle, ReliabilityStore};
use core_runtime::events::{CoreEvent, EventBus, EventStream, PlaybackEvent};
use core_runtime::CoreConfig;
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub(crate) type Reply<T> = oneshot::Sender<Result<T>>;

pub(crate) enum Command {
    Load {
        descriptors: Vec<ChunkDescriptor>,
        reply: Reply<()>,
    },
    Extend {
        descriptors: Vec<ChunkDescriptor>,
        reply: Reply<()>,
    },
    Play {
        reply: Reply<()>,
    },
    Pause {
        reply: Reply<()>,
    },
    Stop {
        reply: Reply<()>,
    },
    Seek {
        time: f64,
        reply: Reply<()>,
    },
    Dispose {
        reply: oneshot::Sender<()>,
    },
}

/// The buffer currently handed to the output.
struct ActiveSource {
    chunk: BufferedChunk,
    handle: Box<dyn OutputHandle>,
    token: u64,
    last_position: Duration,
    last_progress_at: Duration,
    /// Consecutive stalls within this chunk
    stalls: u32,
}

/// A chunk the playback path is waiting for.
struct PendingStart {
    token: u64,
    chunk_index: usize,
    offset: f64,
    retries_left: u32,
    /// Chunk that played before this one, for the transition event
    from: Option<usize>,
    reply: Option<Reply<()>>,
}

type PendingLoad = BoxFuture<'static, (u64, Result<BufferedChunk>)>;

enum TickOutcome {
    Progressed { recovered: bool },
    Waiting,
    Stalled {
        chunk: BufferedChunk,
        position: Duration,
        stalls: u32,
    },
}

pub(crate) struct Scheduler {
    config: EngineConfig,
    buffer: BufferManager,
    output: Arc<dyn AudioOutput>,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn ReliabilityStore>>,
    strategy: Arc<dyn BufferingStrategy>,
    events: EventBus,
    buffer_events: EventStream,
    snapshots: watch::Sender<SessionState>,
    completions_tx: mpsc::UnboundedSender<u64>,
    completions_rx: mpsc::UnboundedReceiver<u64>,

    session_id: Option<Uuid>,
    table: DescriptorTable,
    timeline: VirtualTimeline,
    source_key: Option<String>,

    state: PlaybackState,
    current_chunk: usize,
    /// Cursor offset inside `current_chunk` while no source is active
    offset: f64,
    active: Option<ActiveSource>,
    pending: Option<PendingStart>,
    pending_load: Option<PendingLoad>,
    watchdog: Option<Interval>,
    at_live_edge: bool,
    look_ahead: usize,
    next_token: u64,
    behavior: BehaviorTracker,
    skip_count: u32,
    stall_count: u32,
}

impl Scheduler {
    pub(crate) fn new(
        core: &CoreConfig,
        config: EngineConfig,
        buffer: BufferManager,
        strategy: Arc<dyn BufferingStrategy>,
        events: EventBus,
        snapshots: watch::Sender<SessionState>,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let look_ahead = config.look_ahead_default;
        let buffer_events = events
            .subscribe()
            .filter(|event| matches!(event, CoreEvent::Buffer(_)));

        Self {
            config,
            buffer,
            output: core.output.clone(),
            clock: core.clock.clone(),
            store: core.reliability_store.clone(),
            strategy,
            events,
            buffer_events,
            snapshots,
            completions_tx,
            completions_rx,
            session_id: None,
            table: DescriptorTable::default(),
            timeline: VirtualTimeline::default(),
            source_key: None,
            state: PlaybackState::Idle,
            current_chunk: 0,
            offset: 0.0,
            active: None,
            pending: None,
            pending_load: None,
            watchdog: None,
            at_live_edge: false,
            look_ahead,
            next_token: 0,
            behavior: BehaviorTracker::default(),
            skip_count: 0,
            stall_count: 0,
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        debug!(strategy = self.strategy.name(), "Scheduler started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle(command).await {
                            break;
                        }
                    }
                    None => {
                        // every handle dropped
                        self.dispose().await;
                        break;
                    }
                },
                Some(token) = self.completions_rx.recv() => self.on_output_complete(token),
                (token, result) = next_load(&mut self.pending_load) => {
                    self.pending_load = None;
                    self.on_chunk_loaded(token, result);
                }
                _ = next_tick(&mut self.watchdog) => self.on_watchdog_tick(),
                // buffer changes (or a lag) only refresh the snapshot
                _ = self.buffer_events.recv() => self.publish(),
            }
        }

        debug!("Scheduler stopped");
    }

    /// Returns `false` once the scheduler should shut down.
    async fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Load { descriptors, reply } => {
                let result = self.load_session(descriptors).await;
                let _ = reply.send(result);
            }
            Command::Extend { descriptors, reply } => {
                let result = self.extend_session(descriptors);
                let _ = reply.send(result);
            }
            // replies once playback starts
            Command::Play { reply } => self.play(reply),
            Command::Pause { reply } => {
                let result = self.pause();
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                self.stop().await;
                let _ = reply.send(Ok(()));
            }
            Command::Seek { time, reply } => {
                let result = self.seek_to(time);
                let _ = reply.send(result);
            }
            Command::Dispose { reply } => {
                self.dispose().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    // ========================================================================
    // Commands
    // ========================================================================

    async fn load_session(&mut self, descriptors: Vec<ChunkDescriptor>) -> Result<()> {
        if self.state != PlaybackState::Idle {
            return Err(PlaybackError::invalid_state("load a session", self.state));
        }

        let table = DescriptorTable::new(descriptors)?;
        let timeline = VirtualTimeline::build(table.descriptors());
        let source_key = table.source_key();

        self.buffer.reset_session(table.clone());
        if let Some(store) = self.store.clone() {
            restore_reliability(store, self.buffer.clone(), source_key.clone()).await;
        }

        let session_id = Uuid::new_v4();
        info!(
            session_id = %session_id,
            chunks = table.len(),
            total_secs = timeline.total_duration(),
            live = table.is_live(),
            "Session loaded"
        );

        self.session_id = Some(session_id);
        self.table = table;
        self.timeline = timeline;
        self.source_key = Some(source_key);
        self.current_chunk = 0;
        self.offset = 0.0;
        self.at_live_edge = false;
        self.look_ahead = self.config.look_ahead_default;
        self.behavior.reset();
        self.skip_count = 0;
        self.stall_count = 0;
        self.publish();
        Ok(())
    }

    fn extend_session(&mut self, descriptors: Vec<ChunkDescriptor>) -> Result<()> {
        if self.session_id.is_none() {
            return Err(PlaybackError::invalid_state(
                "extend a session",
                "no session is loaded",
            ));
        }

        let first_new = self.table.len();
        let mut table = self.table.clone();
        table.extend(descriptors)?;
        self.timeline.extend(&table.descriptors()[first_new..]);
        self.buffer.update_table(table.clone());
        self.table = table;

        info!(
            added = self.table.len() - first_new,
            chunks = self.table.len(),
            live = self.table.is_live(),
            "Session extended"
        );

        let resumable = self.at_live_edge
            && self.state == PlaybackState::Stalled
            && self.current_chunk + 1 < self.table.len();
        if resumable {
            let from = self.current_chunk;
            self.advance(from, None, Some(from));
        } else {
            self.schedule_look_ahead();
            self.publish();
        }
        Ok(())
    }

    fn play(&mut self, reply: Reply<()>) {
        if self.session_id.is_none() {
            let _ = reply.send(Err(PlaybackError::invalid_state(
                "play",
                "no session is loaded",
            )));
            return;
        }

        match self.state {
            PlaybackState::Playing | PlaybackState::Stalled => {
                let _ = reply.send(Ok(()));
            }
            PlaybackState::Completed => {
                let _ = reply.send(Err(PlaybackError::invalid_state("play", self.state)));
            }
            PlaybackState::Idle | PlaybackState::Paused => {
                let (chunk, offset) = (self.current_chunk, self.offset);
                self.start_chunk(chunk, offset, Some(reply), None);
            }
        }
    }

    fn pause(&mut self) -> Result<()> {
        match self.state {
            PlaybackState::Paused => Ok(()),
            PlaybackState::Playing | PlaybackState::Stalled => {
                self.behavior.record_interruption(self.clock.monotonic());
                self.release_output();
                self.cancel_pending();
                self.at_live_edge = false;
                self.set_state(PlaybackState::Paused);
                Ok(())
            }
            other => Err(PlaybackError::invalid_state("pause", other)),
        }
    }

    async fn stop(&mut self) {
        if self.state != PlaybackState::Idle {
            self.behavior.record_interruption(self.clock.monotonic());
        }
        if let Some(save) = self.reliability_save() {
            save.await;
        }
        self.reset_to_idle();
    }

    fn seek_to(&mut self, time: f64) -> Result<()> {
        if self.state == PlaybackState::Idle {
            return Err(PlaybackError::invalid_state("seek", self.state));
        }

        let target = self.timeline.locate(time)?;
        self.behavior.record_seek(self.clock.monotonic());
        info!(
            time,
            chunk = target.chunk_index,
            offset = target.offset,
            "Seeking"
        );

        match self.state {
            PlaybackState::Playing | PlaybackState::Stalled => {
                self.start_chunk(target.chunk_index, target.offset, None, None);
            }
            PlaybackState::Paused | PlaybackState::Completed => {
                self.current_chunk = target.chunk_index;
                self.offset = target.offset;
                self.at_live_edge = false;
                self.schedule_look_ahead();
                // a finished session becomes resumable
                self.set_state(PlaybackState::Paused);
            }
            PlaybackState::Idle => {}
        }
        Ok(())
    }

    async fn dispose(&mut self) {
        if let Some(save) = self.reliability_save() {
            save.await;
        }
        self.release_output();
        self.cancel_pending();
        self.buffer.shutdown();

        self.session_id = None;
        self.table = DescriptorTable::default();
        self.timeline = VirtualTimeline::default();
        self.source_key = None;
        self.current_chunk = 0;
        self.offset = 0.0;
        self.at_live_edge = false;
        self.set_state(PlaybackState::Idle);
        info!("Playback engine disposed");
    }

    // ========================================================================
    // Playback path
    // ========================================================================

    /// Make `index` the current chunk and start it from `offset`, loading it
    /// first if needed.
    fn start_chunk(
        &mut self,
        index: usize,
        offset: f64,
        reply: Option<Reply<()>>,
        from: Option<usize>,
    ) {
        self.release_output();
        self.cancel_pending();
        self.current_chunk = index;
        self.offset = offset;
        self.at_live_edge = false;
        self.buffer.evict(index);

        match self.buffer.get(index) {
            Some(chunk) => self.begin_chunk(chunk, offset, reply, from),
            None => {
                let token = self.next_token();
                self.pending_load = Some(load_chunk(self.buffer.clone(), index, token));
                self.pending = Some(PendingStart {
                    token,
                    chunk_index: index,
                    offset,
                    retries_left: self.config.sync_retry_attempts,
                    from,
                    reply,
                });
                debug!(chunk = index, "Waiting for chunk data");
                self.set_state(PlaybackState::Stalled);
            }
        }

        self.schedule_look_ahead();
        self.publish();
    }

    fn begin_chunk(
        &mut self,
        chunk: BufferedChunk,
        offset: f64,
        reply: Option<Reply<()>>,
        from: Option<usize>,
    ) {
        let index = chunk.chunk_index;
        match self.begin_output(chunk, offset, 0) {
            Ok(()) => {
                self.set_state(PlaybackState::Playing);
                if let Some(from) = from {
                    debug!(from, to = index, "Chunk transition");
                    self.emit(PlaybackEvent::ChunkTransition { from, to: index });
                }
                if let Some(reply) = reply {
                    let _ = reply.send(Ok(()));
                }
            }
            Err(error) => self.fail_terminally(error, reply),
        }
    }

    /// Hand a buffer to the output and arm the watchdog.
    fn begin_output(&mut self, chunk: BufferedChunk, offset: f64, stalls: u32) -> Result<()> {
        let offset = offset.clamp(0.0, chunk.decoded_duration);
        let token = self.next_token();
        let completions = self.completions_tx.clone();

        let handle = self
            .output
            .play_buffer(
                chunk.buffer.clone(),
                Duration::from_secs_f64(offset),
                Box::new(move || {
                    let _ = completions.send(token);
                }),
            )
            .map_err(|e| PlaybackError::Output(e.to_string()))?;

        self.offset = offset;
        self.active = Some(ActiveSource {
            last_position: handle.position(),
            last_progress_at: self.clock.monotonic(),
            chunk,
            handle,
            token,
            stalls,
        });
        self.arm_watchdog();
        Ok(())
    }

    fn on_chunk_loaded(&mut self, token: u64, result: Result<BufferedChunk>) {
        if self.pending.as_ref().map(|p| p.token) != Some(token) {
            return;
        }
        let Some(mut pending) = self.pending.take() else {
            return;
        };

        match result {
            Ok(chunk) => {
                self.begin_chunk(chunk, pending.offset, pending.reply, pending.from);
                self.schedule_look_ahead();
                self.publish();
            }
            Err(error) if pending.retries_left > 0 => {
                warn!(
                    chunk = pending.chunk_index,
                    error = %error,
                    retries_left = pending.retries_left,
                    "Retrying chunk on the playback path"
                );
                pending.retries_left -= 1;
                pending.token = self.next_token();
                self.pending_load = Some(load_chunk(
                    self.buffer.clone(),
                    pending.chunk_index,
                    pending.token,
                ));
                self.pending = Some(pending);
            }
            Err(error) => {
                self.skip_chunk(
                    pending.chunk_index,
                    error.to_string(),
                    pending.reply,
                    pending.from,
                );
            }
        }
    }

    fn on_output_complete(&mut self, token: u64) {
        if self.active.as_ref().map(|a| a.token) != Some(token) {
            // a source we already stopped or replaced
            return;
        }
        let Some(active) = self.active.take() else {
            return;
        };
        self.watchdog = None;
        self.offset = active.chunk.decoded_duration;

        let index = self.current_chunk;
        debug!(chunk = index, "Chunk finished playing");

        if index + 1 < self.table.len() {
            self.advance(index, None, Some(index));
        } else if self.table.is_live() {
            self.wait_at_live_edge(None);
        } else {
            self.complete();
        }
    }

    /// Move past `index`, skipping chunks already known to be unplayable.
    fn advance(&mut self, index: usize, reply: Option<Reply<()>>, from: Option<usize>) {
        let next = index + 1;
        self.buffer.evict(next);

        if !self.buffer.is_buffered(next) && self.buffer.should_skip(next) {
            self.current_chunk = next;
            self.offset = 0.0;
            let reason = format!(
                "reliability {:.2} below skip threshold",
                self.buffer.score(next)
            );
            self.skip_chunk(next, reason, reply, from);
            return;
        }

        self.start_chunk(next, 0.0, reply, from);
    }

    /// Chunk-failure recovery: record the skip and continue with the next
    /// chunk, or end playback when there is none.
    fn skip_chunk(
        &mut self,
        index: usize,
        reason: String,
        reply: Option<Reply<()>>,
        from: Option<usize>,
    ) {
        self.skip_count += 1;
        warn!(chunk = index, reason = %reason, "Skipping chunk");
        self.emit(PlaybackEvent::ChunkSkipped { index, reason });

        if index + 1 < self.table.len() {
            self.advance(index, reply, from);
        } else if self.table.is_live() {
            self.current_chunk = index;
            self.wait_at_live_edge(reply);
        } else {
            let error = PlaybackError::TerminalPlayback(format!(
                "chunk {} failed and no further chunks are available",
                index
            ));
            self.fail_terminally(error, reply);
        }
    }

    fn wait_at_live_edge(&mut self, reply: Option<Reply<()>>) {
        self.release_output();
        self.at_live_edge = true;
        info!(
            chunk = self.current_chunk,
            "Reached the live edge, waiting for more chunks"
        );
        self.set_state(PlaybackState::Stalled);
        if let Some(reply) = reply {
            let _ = reply.send(Ok(()));
        }
    }

    fn complete(&mut self) {
        self.release_output();
        let total_duration_ms = (self.timeline.total_duration() * 1000.0) as u64;
        info!(total_duration_ms, skipped = self.skip_count, "Playback completed");
        self.set_state(PlaybackState::Completed);
        self.emit(PlaybackEvent::Completed { total_duration_ms });
    }

    fn fail_terminally(&mut self, error: PlaybackError, reply: Option<Reply<()>>) {
        error!(error = %error, "Playback cannot continue");
        self.emit(PlaybackEvent::Error {
            kind: error.kind().to_string(),
            message: error.to_string(),
            recoverable: false,
        });

        if let Some(save) = self.reliability_save() {
            tokio::spawn(save);
        }
        self.reset_to_idle();

        if let Some(reply) = reply {
            let _ = reply.send(Err(error));
        }
    }

    // ========================================================================
    // Stall watchdog
    // ========================================================================

    fn arm_watchdog(&mut self) {
        let period = self.config.watchdog_interval();
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.watchdog = Some(interval);
    }

    fn on_watchdog_tick(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        let now = self.clock.monotonic();
        let tolerance = self.config.stall_tolerance();

        let outcome = {
            let Some(active) = self.active.as_mut() else {
                return;
            };
            let position = active.handle.position();
            if position > active.last_position {
                active.last_position = position;
                active.last_progress_at = now;
                let recovered = active.stalls > 0;
                active.stalls = 0;
                TickOutcome::Progressed { recovered }
            } else if now.saturating_sub(active.last_progress_at) < tolerance {
                TickOutcome::Waiting
            } else {
                active.stalls += 1;
                TickOutcome::Stalled {
                    chunk: active.chunk.clone(),
                    position,
                    stalls: active.stalls,
                }
            }
        };

        let index = self.current_chunk;
        match outcome {
            TickOutcome::Waiting => {}
            TickOutcome::Progressed { recovered } => {
                if recovered {
                    info!(chunk = index, "Playback recovered from stall");
                    self.emit(PlaybackEvent::StallRecovered { index });
                }
                self.publish();
            }
            TickOutcome::Stalled {
                chunk,
                position,
                stalls,
            } => {
                self.stall_count += 1;
                warn!(
                    chunk = index,
                    position_secs = position.as_secs_f64(),
                    consecutive = stalls,
                    "Playback stalled"
                );
                self.emit(PlaybackEvent::StallDetected {
                    index,
                    position_ms: position.as_millis() as u64,
                    consecutive: stalls,
                });

                if stalls > self.config.stall_retry_budget {
                    let score = self.buffer.report_playback_failure(index);
                    debug!(chunk = index, score, "Stall budget exhausted");
                    self.release_output();
                    self.skip_chunk(
                        index,
                        format!("stalled {} times in a row", stalls),
                        None,
                        Some(index),
                    );
                } else {
                    self.release_output();
                    let offset = position.as_secs_f64();
                    if let Err(error) = self.begin_output(chunk, offset, stalls) {
                        self.fail_terminally(error, None);
                    }
                }
                self.publish();
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Stop the active source (remembering where it was) and the watchdog.
    fn release_output(&mut self) {
        if let Some(mut active) = self.active.take() {
            let position = active.handle.position().as_secs_f64();
            active.handle.stop();
            self.offset = position.min(active.chunk.decoded_duration);
        }
        self.watchdog = None;
    }

    /// Abandon the chunk load the playback path was waiting for.
    fn cancel_pending(&mut self) {
        self.pending_load = None;
        if let Some(pending) = self.pending.take() {
            self.current_chunk = pending.chunk_index;
            self.offset = pending.offset;
            if let Some(reply) = pending.reply {
                let _ = reply.send(Ok(()));
            }
        }
    }

    fn reset_to_idle(&mut self) {
        self.release_output();
        self.cancel_pending();
        self.buffer.clear();
        self.current_chunk = 0;
        self.offset = 0.0;
        self.at_live_edge = false;
        self.set_state(PlaybackState::Idle);
    }

    fn schedule_look_ahead(&mut self) {
        if self.table.is_empty() {
            return;
        }

        let reliability = self.buffer.reliability();
        let context = StrategyContext {
            current_chunk: self.current_chunk,
            total_chunks: self.table.len(),
            recent_failures: self.buffer.recent_failures(),
            behavior: self.behavior.classify(self.clock.monotonic()),
            reliability: &reliability,
        };
        let decision = self.strategy.decide(&context);

        self.look_ahead = decision.look_ahead_count;
        self.buffer.buffer_ahead(&decision);
        self.buffer.evict(self.current_chunk);
        let keep = decision
            .look_ahead_count
            .max(self.config.look_ahead_default + 1);
        self.buffer.trim_ahead(self.current_chunk + keep);
    }

    /// Future that writes the current scores to the store, if persistence
    /// applies.
    fn reliability_save(&self) -> Option<BoxFuture<'static, ()>> {
        if !self.config.persist_reliability {
            return None;
        }
        let store = self.store.clone()?;
        let source_key = self.source_key.clone()?;
        let snapshot = self.buffer.export_reliability(&source_key);
        if snapshot.scores.is_empty() {
            return None;
        }

        Some(
            async move {
                match serde_json::to_string(&snapshot) {
                    Ok(payload) => match store.save(&source_key, &payload).await {
                        Ok(()) => debug!(chunks = snapshot.scores.len(), "Saved reliability history"),
                        Err(e) => warn!(error = %e, "Failed to save reliability history"),
                    },
                    Err(e) => warn!(error = %e, "Failed to serialize reliability history"),
                }
            }
            .boxed(),
        )
    }

    fn set_state(&mut self, next: PlaybackState) {
        let previous = self.state;
        self.state = next;

        if previous != next {
            let position = self.position();
            info!(
                from = %previous,
                to = %next,
                chunk = self.current_chunk,
                position_secs = position,
                "Playback state changed"
            );
            self.emit(PlaybackEvent::StateChanged {
                previous: previous.to_string(),
                current: next.to_string(),
                chunk_index: self.current_chunk,
                position_ms: (position * 1000.0) as u64,
            });
        }
        self.publish();
    }

    fn position(&self) -> f64 {
        let start = self.timeline.start_of(self.current_chunk).unwrap_or(0.0);
        let offset = match &self.active {
            Some(active) => active
                .handle
                .position()
                .as_secs_f64()
                .min(active.chunk.decoded_duration),
            None => self.offset,
        };
        start + offset
    }

    fn snapshot(&self) -> SessionState {
        SessionState {
            session_id: self.session_id,
            state: self.state,
            current_chunk: self.current_chunk,
            position: self.position(),
            total_duration: self.timeline.total_duration(),
            buffer_health: self
                .buffer
                .buffer_health(self.current_chunk, self.look_ahead),
            buffered_chunks: self.buffer.buffered_count(),
            chunk_count: self.table.len(),
            is_live: self.session_id.is_some() && self.table.is_live(),
            skip_count: self.skip_count,
            stall_count: self.stall_count,
            recent_failures: self.buffer.recent_failures(),
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }

    fn emit(&self, event: PlaybackEvent) {
        self.events.emit(CoreEvent::Playback(event)).ok();
    }

    fn next_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }
}

/// Import saved scores for `source_key` into `buffer`.
async fn restore_reliability(
    store: Arc<dyn ReliabilityStore>,
    buffer: BufferManager,
    source_key: String,
) {
    match store.load(&source_key).await {
        Ok(Some(payload)) => match serde_json::from_str::<ReliabilitySnapshot>(&payload) {
            Ok(snapshot) => {
                debug!(chunks = snapshot.scores.len(), "Restored reliability history");
                buffer.import_reliability(&snapshot);
            }
            Err(e) => warn!(error = %e, "Ignoring unreadable reliability snapshot"),
        },
        Ok(None) => debug!("No reliability history for this source"),
        Err(e) => warn!(error = %e, "Failed to load reliability history"),
    }
}

fn load_chunk(buffer: BufferManager, index: usize, token: u64) -> PendingLoad {
    async move { (token, buffer.ensure_buffered(index).await) }.boxed()
}

async fn next_load(load: &mut Option<PendingLoad>) -> (u64, Result<BufferedChunk>) {
    match load {
        Some(load) => load.await,
        None => std::future::pending().await,
    }
}

async fn next_tick(watchdog: &mut Option<Interval>) {
    match watchdog {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
