//! Workspace placeholder crate.
//!
//! This crate exposes shared feature flags that map to the individual
//! workspace crates (`core-playback`, `core-runtime`, `bridge-desktop`).
//! Host applications can depend on `chunkstream-workspace` and enable the
//! documented features without wiring each crate individually.

#[cfg(feature = "engine")]
pub use core_playback as playback;

#[cfg(feature = "engine")]
pub use core_runtime as runtime;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop as desktop;
