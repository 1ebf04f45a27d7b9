//! # Core Configuration
//!
//! Capability wiring for the playback core.
//!
//! The host supplies implementations of the bridge traits through
//! [`CoreConfigBuilder`]. Building fails fast with
//! [`Error::CapabilityMissing`] when a required capability is absent, so a
//! misconfigured host finds out at startup instead of on the first `play()`.
//!
//! | Capability | Required | Desktop default (`desktop-shims`) |
//! |------------|----------|-----------------------------------|
//! | `ChunkFetcher` | yes | `HttpChunkFetcher` |
//! | `ChunkDecoder` | yes | none, always injected |
//! | `AudioOutput` | yes | `TimedAudioOutput` |
//! | `Clock` | no | `SystemClock` |
//! | `ReliabilityStore` | no | `SqliteReliabilityStore` when a database path is set |
//!
//! ```ignore
//! let config = CoreConfig::builder()
//!     .fetcher(Arc::new(HttpChunkFetcher::new()?))
//!     .decoder(Arc::new(SymphoniaChunkDecoder::new()))
//!     .output(Arc::new(TimedAudioOutput::new()))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{AudioOutput, ChunkDecoder, ChunkFetcher, Clock, ReliabilityStore, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;

/// Wired capabilities and runtime options.
#[derive(Clone)]
pub struct CoreConfig {
    pub fetcher: Arc<dyn ChunkFetcher>,
    pub decoder: Arc<dyn ChunkDecoder>,
    pub output: Arc<dyn AudioOutput>,
    pub clock: Arc<dyn Clock>,
    /// Optional persistence of reliability history across sessions
    pub reliability_store: Option<Arc<dyn ReliabilityStore>>,
    /// Capacity of the event bus broadcast channel
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("fetcher", &"ChunkFetcher { ... }")
            .field("decoder", &"ChunkDecoder { ... }")
            .field("output", &"AudioOutput { ... }")
            .field("clock", &"Clock { ... }")
            .field(
                "reliability_store",
                &self
                    .reliability_store
                    .as_ref()
                    .map(|_| "ReliabilityStore { ... }"),
            )
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size > 65_536 {
            return Err(Error::Config(
                "Event buffer size exceeds maximum of 65,536 events".to_string(),
            ));
        }

        Ok(())
    }
}

fn capability_missing(capability: &str, message: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: message.to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn capability_init(capability: &str, message: impl Into<String>) -> Error {
    Error::CapabilityInit {
        capability: capability.to_string(),
        message: message.into(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_fetcher() -> Result<Arc<dyn ChunkFetcher>> {
    use bridge_desktop::HttpChunkFetcher;

    let fetcher =
        HttpChunkFetcher::new().map_err(|e| capability_init("ChunkFetcher", e.to_string()))?;
    Ok(Arc::new(fetcher))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_fetcher() -> Result<Arc<dyn ChunkFetcher>> {
    Err(capability_missing(
        "ChunkFetcher",
        "A chunk fetcher is required to retrieve chunk bytes. \
         Desktop: enable the 'desktop-shims' feature to use HttpChunkFetcher. \
         Other hosts: inject a platform-native fetcher.",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_output() -> Result<Arc<dyn AudioOutput>> {
    Ok(Arc::new(bridge_desktop::TimedAudioOutput::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_output() -> Result<Arc<dyn AudioOutput>> {
    Err(capability_missing(
        "AudioOutput",
        "An audio output is required to play decoded chunks. \
         Desktop: enable the 'desktop-shims' feature to use TimedAudioOutput \
         or inject a device-backed output.",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_reliability_store(path: PathBuf) -> Result<Arc<dyn ReliabilityStore>> {
    use bridge_desktop::SqliteReliabilityStore;
    use std::thread;
    use tokio::runtime::{Builder, Handle};

    let init_store = |path: PathBuf| -> Result<_> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| capability_init("ReliabilityStore", format!("no runtime: {}", e)))?;

        runtime
            .block_on(SqliteReliabilityStore::new(path))
            .map_err(|e| capability_init("ReliabilityStore", e.to_string()))
    };

    // block_on panics inside an existing runtime, so hop to a plain thread
    let store = match Handle::try_current() {
        Ok(_) => thread::spawn(move || init_store(path))
            .join()
            .map_err(|_| capability_init("ReliabilityStore", "worker thread panicked"))??,
        Err(_) => init_store(path)?,
    };

    Ok(Arc::new(store))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_reliability_store(_path: PathBuf) -> Result<Arc<dyn ReliabilityStore>> {
    Err(capability_missing(
        "ReliabilityStore",
        "A reliability database path was set but no store implementation is available. \
         Enable the 'desktop-shims' feature or inject a ReliabilityStore.",
    ))
}

#[derive(Default)]
pub struct CoreConfigBuilder {
    fetcher: Option<Arc<dyn ChunkFetcher>>,
    decoder: Option<Arc<dyn ChunkDecoder>>,
    output: Option<Arc<dyn AudioOutput>>,
    clock: Option<Arc<dyn Clock>>,
    reliability_store: Option<Arc<dyn ReliabilityStore>>,
    reliability_database_path: Option<PathBuf>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    pub fn fetcher(mut self, fetcher: Arc<dyn ChunkFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn ChunkDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn output(mut self, output: Arc<dyn AudioOutput>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn reliability_store(mut self, store: Arc<dyn ReliabilityStore>) -> Self {
        self.reliability_store = Some(store);
        self
    }

    /// Open the default SQLite reliability store at `path` during `build()`.
    ///
    /// Ignored when a store is injected with [`Self::reliability_store`].
    pub fn reliability_database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.reliability_database_path = Some(path.into());
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn build(self) -> Result<CoreConfig> {
        let decoder = self.decoder.ok_or_else(|| {
            capability_missing(
                "ChunkDecoder",
                "A chunk decoder is required to turn chunk bytes into playable audio. \
                 Inject a platform decoder or enable core-playback's 'core-decoder' feature \
                 and use SymphoniaChunkDecoder.",
            )
        })?;

        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => provide_default_fetcher()?,
        };

        let output = match self.output {
            Some(output) => output,
            None => provide_default_output()?,
        };

        let reliability_store = match (self.reliability_store, self.reliability_database_path) {
            (Some(store), _) => Some(store),
            (None, Some(path)) => Some(provide_reliability_store(path)?),
            (None, None) => None,
        };

        let config = CoreConfig {
            fetcher,
            decoder,
            output,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock::new())),
            reliability_store,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}
