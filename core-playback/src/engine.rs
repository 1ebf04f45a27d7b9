//! # Playback Engine
//!
//! Public handle to one playback session.
//!
//! The engine owns a scheduler task that serializes every command, so
//! concurrent callers observe a single total order of state transitions.
//! Handles are cheap to clone; the task shuts down on [`PlaybackEngine::dispose`]
//! or when the last handle is dropped.
//!
//! ## Usage
//!
//! ```ignore
//! use core_playback::{ChunkDescriptor, EngineConfig, PlaybackEngine};
//!
//! let engine = PlaybackEngine::new(&core_config, EngineConfig::default())?;
//! engine
//!     .load_session(vec![
//!         ChunkDescriptor::new("intro", "https://cdn.example.com/a.mp3", 0, 60.0),
//!         ChunkDescriptor::new("body", "https://cdn.example.com/b.mp3", 1, 45.0).final_chunk(),
//!     ])
//!     .await?;
//! engine.play().await?;
//!
//! let mut events = engine.subscribe();
//! while let Ok(event) = events.recv().await {
//!     println!("{}", event.description());
//! }
//! ```

use crate::buffer::BufferManager;
use crate::config::EngineConfig;
use crate::descriptor::ChunkDescriptor;
use crate::error::{PlaybackError, Result};
use crate::scheduler::{Command, Scheduler};
use crate::state::SessionState;
use crate::strategy::{BufferingStrategy, HeuristicStrategy};
use core_runtime::events::{EventBus, EventStream};
use core_runtime::CoreConfig;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::info;

#[derive(Clone)]
pub struct PlaybackEngine {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<SessionState>,
    events: EventBus,
}

impl PlaybackEngine {
    /// Create an engine with the default [`HeuristicStrategy`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(core: &CoreConfig, config: EngineConfig) -> Result<Self> {
        let strategy = Arc::new(HeuristicStrategy::new(config.look_ahead_default));
        Self::with_strategy(core, config, strategy)
    }

    /// Create an engine with a custom buffering strategy.
    pub fn with_strategy(
        core: &CoreConfig,
        config: EngineConfig,
        strategy: Arc<dyn BufferingStrategy>,
    ) -> Result<Self> {
        config.validate().map_err(PlaybackError::Config)?;
        core.validate()
            .map_err(|e| PlaybackError::Config(e.to_string()))?;
        let runtime = Handle::try_current().map_err(|_| {
            PlaybackError::Config("PlaybackEngine requires a Tokio runtime".to_string())
        })?;

        let events = EventBus::new(core.event_buffer_size);
        let buffer = BufferManager::new(
            core.fetcher.clone(),
            core.decoder.clone(),
            core.clock.clone(),
            events.clone(),
            config.clone(),
        );
        let (snapshots_tx, snapshots) = watch::channel(SessionState::empty());
        let (commands, commands_rx) = mpsc::channel(config.command_channel_capacity);

        info!(
            strategy = strategy.name(),
            look_ahead = config.look_ahead_default,
            "Starting playback engine"
        );
        let scheduler = Scheduler::new(core, config, buffer, strategy, events.clone(), snapshots_tx);
        runtime.spawn(scheduler.run(commands_rx));

        Ok(Self {
            commands,
            snapshots,
            events,
        })
    }

    /// Install a chunk list as the current session. Only valid while idle.
    ///
    /// Scores restored from the reliability store (if any) apply immediately.
    pub async fn load_session(&self, descriptors: Vec<ChunkDescriptor>) -> Result<()> {
        self.request(|reply| Command::Load { descriptors, reply })
            .await
    }

    /// Append chunks to a live session.
    ///
    /// A session waiting at its live edge resumes with the first new chunk.
    pub async fn extend_session(&self, descriptors: Vec<ChunkDescriptor>) -> Result<()> {
        self.request(|reply| Command::Extend { descriptors, reply })
            .await
    }

    /// Start or resume playback.
    ///
    /// Returns once the current chunk is handed to the output, or once the
    /// scheduler has given up on it.
    pub async fn play(&self) -> Result<()> {
        self.request(|reply| Command::Play { reply }).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(|reply| Command::Pause { reply }).await
    }

    /// Stop playback, release all buffers and return to `Idle`. Idempotent.
    ///
    /// The session stays loaded; `play` restarts from the beginning.
    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Jump to `time` seconds on the virtual timeline.
    ///
    /// Fails with [`PlaybackError::OutOfRange`] (and changes nothing) unless
    /// `0 <= time < total_duration`.
    pub async fn seek_to(&self, time: f64) -> Result<()> {
        self.request(|reply| Command::Seek { time, reply }).await
    }

    /// Release everything and stop the scheduler task.
    ///
    /// Further commands fail with [`PlaybackError::Disposed`]. Calling this
    /// twice is harmless.
    pub async fn dispose(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        if self.commands.send(Command::Dispose { reply }).await.is_err() {
            return Ok(());
        }
        let _ = response.await;
        Ok(())
    }

    /// Latest published snapshot.
    pub fn state(&self) -> SessionState {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every published snapshot.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.snapshots.clone()
    }

    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn is_disposed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| PlaybackError::Disposed)?;
        response.await.map_err(|_| PlaybackError::Disposed)?
    }
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.snapshots.borrow();
        f.debug_struct("PlaybackEngine")
            .field("state", &state.state)
            .field("current_chunk", &state.current_chunk)
            .field("disposed", &self.commands.is_closed())
            .finish()
    }
}
