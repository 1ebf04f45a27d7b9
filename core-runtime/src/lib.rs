//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the playback core and its hosts:
//! - Logging and tracing bootstrap
//! - Capability configuration with fail-fast validation
//! - Event bus for state and telemetry notifications

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder};
pub use error::{Error, Result};
pub use events::{BufferEvent, CoreEvent, EventBus, EventStream, PlaybackEvent};
