//! # Engine Configuration
//!
//! Tunables for scheduling, buffering, stall detection and reliability
//! scoring. Every constant the engine uses lives here so hosts can adjust
//! them without code changes.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reliability scoring parameters.
///
/// Scores move asymmetrically: a failure costs more than a success earns, so
/// a chunk that keeps failing crosses the skip threshold quickly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    /// Score of a chunk with no recorded outcomes.
    ///
    /// Default: 0.8.
    #[serde(default = "default_score")]
    pub default_score: f64,

    /// Added on a successful fetch+decode.
    ///
    /// Default: 0.1.
    #[serde(default = "default_success_step")]
    pub success_step: f64,

    /// Subtracted on a failed fetch or decode.
    ///
    /// Default: 0.2.
    #[serde(default = "default_failure_step")]
    pub failure_step: f64,

    /// Lowest possible score.
    ///
    /// Default: 0.1.
    #[serde(default = "default_floor")]
    pub floor: f64,

    /// Highest possible score.
    ///
    /// Default: 1.0.
    #[serde(default = "default_ceiling")]
    pub ceiling: f64,

    /// Scores strictly below this mark a chunk skip-eligible.
    ///
    /// Default: 0.3.
    #[serde(default = "default_skip_threshold")]
    pub skip_threshold: f64,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            default_score: default_score(),
            success_step: default_success_step(),
            failure_step: default_failure_step(),
            floor: default_floor(),
            ceiling: default_ceiling(),
            skip_threshold: default_skip_threshold(),
        }
    }
}

impl ReliabilityConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        let ordered = 0.0 <= self.floor
            && self.floor <= self.skip_threshold
            && self.skip_threshold <= self.default_score
            && self.default_score <= self.ceiling
            && self.ceiling <= 1.0;
        if !ordered {
            return Err(
                "reliability bounds must satisfy 0 <= floor <= skip_threshold <= default_score <= ceiling <= 1"
                    .to_string(),
            );
        }

        if !(self.success_step > 0.0) || !(self.failure_step > 0.0) {
            return Err("reliability steps must be > 0".to_string());
        }

        Ok(())
    }
}

/// Playback engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base number of chunks buffered ahead of the cursor.
    ///
    /// Default: 3.
    #[serde(default = "default_look_ahead")]
    pub look_ahead_default: usize,

    /// Number of already-played chunks kept buffered for quick back-seeks.
    ///
    /// Default: 2.
    #[serde(default = "default_eviction_window")]
    pub eviction_window: usize,

    /// Period of the stall watchdog.
    ///
    /// Default: 1000 ms.
    #[serde(default = "default_watchdog_interval_ms")]
    pub watchdog_interval_ms: u64,

    /// How long the output position may stay unchanged before a stall is
    /// declared.
    ///
    /// Default: 1000 ms.
    #[serde(default = "default_stall_tolerance_ms")]
    pub stall_tolerance_ms: u64,

    /// Restarts allowed for consecutive stalls within one chunk before the
    /// chunk is treated as failed.
    ///
    /// Default: 3.
    #[serde(default = "default_stall_retry_budget")]
    pub stall_retry_budget: u32,

    /// Retries after the first failure when the chunk about to play cannot be
    /// buffered.
    ///
    /// Default: 1.
    #[serde(default = "default_sync_retry_attempts")]
    pub sync_retry_attempts: u32,

    /// Deadline for a single chunk fetch.
    ///
    /// Default: 30 seconds.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Deadline for decoding a single chunk.
    ///
    /// Default: 10 seconds.
    #[serde(default = "default_decode_timeout_ms")]
    pub decode_timeout_ms: u64,

    /// Window over which failures count as "recent" for the strategy.
    ///
    /// Default: 60 seconds.
    #[serde(default = "default_failure_window_ms")]
    pub failure_window_ms: u64,

    /// Capacity of the command queue between engine handles and the
    /// scheduler task.
    ///
    /// Default: 32.
    #[serde(default = "default_command_channel_capacity")]
    pub command_channel_capacity: usize,

    /// Whether reliability snapshots are written to the host store on stop.
    ///
    /// Default: true.
    #[serde(default = "default_persist_reliability")]
    pub persist_reliability: bool,

    #[serde(default)]
    pub reliability: ReliabilityConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            look_ahead_default: default_look_ahead(),
            eviction_window: default_eviction_window(),
            watchdog_interval_ms: default_watchdog_interval_ms(),
            stall_tolerance_ms: default_stall_tolerance_ms(),
            stall_retry_budget: default_stall_retry_budget(),
            sync_retry_attempts: default_sync_retry_attempts(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            decode_timeout_ms: default_decode_timeout_ms(),
            failure_window_ms: default_failure_window_ms(),
            command_channel_capacity: default_command_channel_capacity(),
            persist_reliability: default_persist_reliability(),
            reliability: ReliabilityConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create a configuration optimized for low latency.
    ///
    /// - Shallow look-ahead (2 chunks)
    /// - Faster stall detection (500 ms)
    /// - Shorter fetch/decode deadlines
    pub fn low_latency() -> Self {
        Self {
            look_ahead_default: 2,
            watchdog_interval_ms: 500,
            stall_tolerance_ms: 500,
            fetch_timeout_ms: 10_000,
            decode_timeout_ms: 5_000,
            ..Default::default()
        }
    }

    /// Create a configuration for unreliable chunk sources.
    ///
    /// - Deep look-ahead (5 chunks)
    /// - More stall restarts and sync retries
    /// - Longer deadlines
    pub fn resilient() -> Self {
        Self {
            look_ahead_default: 5,
            eviction_window: 3,
            stall_retry_budget: 5,
            sync_retry_attempts: 2,
            fetch_timeout_ms: 60_000,
            decode_timeout_ms: 20_000,
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.look_ahead_default == 0 {
            return Err("look_ahead_default must be >= 1".to_string());
        }

        if self.watchdog_interval_ms == 0 || self.stall_tolerance_ms == 0 {
            return Err("watchdog_interval_ms and stall_tolerance_ms must be > 0".to_string());
        }

        if self.fetch_timeout_ms == 0 || self.decode_timeout_ms == 0 {
            return Err("fetch_timeout_ms and decode_timeout_ms must be > 0".to_string());
        }

        if self.failure_window_ms == 0 {
            return Err("failure_window_ms must be > 0".to_string());
        }

        if self.command_channel_capacity == 0 {
            return Err("command_channel_capacity must be > 0".to_string());
        }

        self.reliability.validate()
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }

    pub fn stall_tolerance(&self) -> Duration {
        Duration::from_millis(self.stall_tolerance_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_millis(self.decode_timeout_ms)
    }

    pub fn failure_window(&self) -> Duration {
        Duration::from_millis(self.failure_window_ms)
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_score() -> f64 {
    0.8
}

fn default_success_step() -> f64 {
    0.1
}

fn default_failure_step() -> f64 {
    0.2
}

fn default_floor() -> f64 {
    0.1
}

fn default_ceiling() -> f64 {
    1.0
}

fn default_skip_threshold() -> f64 {
    0.3
}

fn default_look_ahead() -> usize {
    3
}

fn default_eviction_window() -> usize {
    2
}

fn default_watchdog_interval_ms() -> u64 {
    1_000
}

fn default_stall_tolerance_ms() -> u64 {
    1_000
}

fn default_stall_retry_budget() -> u32 {
    3
}

fn default_sync_retry_attempts() -> u32 {
    1
}

fn default_fetch_timeout_ms() -> u64 {
    30_000
}

fn default_decode_timeout_ms() -> u64 {
    10_000
}

fn default_failure_window_ms() -> u64 {
    60_000
}

fn default_command_channel_capacity() -> usize {
    32
}

fn default_persist_reliability() -> bool {
    true
}
