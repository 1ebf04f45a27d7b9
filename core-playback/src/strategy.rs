//! # Buffering Strategy Policy
//!
//! A strategy is a pure function from the current playback context to a
//! [`BufferingDecision`]: how far to look ahead, in which order to fetch,
//! and how aggressively to repair failures.
//!
//! ## Implementations
//!
//! - [`HeuristicStrategy`] - fixed table driven by progress and recent failures (default)
//! - [`PatternAwareStrategy`] - heuristic refined by externally supplied [`SessionHistory`]
//!
//! Custom strategies implement [`BufferingStrategy`] and are injected with
//! `PlaybackEngine::with_strategy`.

use crate::behavior::ListeningBehavior;
use crate::reliability::ReliabilityTracker;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How the buffer manager schedules look-ahead work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairMode {
    /// One background task walks the priority list in order
    Background,
    /// Every index is fetched concurrently
    Immediate,
    /// Like `Immediate`, but chunks scoring below the neutral default are left out
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferingDecision {
    pub look_ahead_count: usize,
    pub priority_indices: Vec<usize>,
    pub repair_mode: RepairMode,
}

/// Read-only view of playback state handed to a strategy.
#[derive(Debug, Clone, Copy)]
pub struct StrategyContext<'a> {
    pub current_chunk: usize,
    pub total_chunks: usize,
    /// Fetch/decode failures within the configured failure window
    pub recent_failures: u32,
    pub behavior: ListeningBehavior,
    pub reliability: &'a ReliabilityTracker,
}

impl StrategyContext<'_> {
    /// `current_chunk / total_chunks`, 0 for an empty session.
    pub fn progress_ratio(&self) -> f64 {
        if self.total_chunks == 0 {
            0.0
        } else {
            self.current_chunk as f64 / self.total_chunks as f64
        }
    }
}

/// Pluggable buffering policy.
pub trait BufferingStrategy: Send + Sync {
    fn decide(&self, context: &StrategyContext<'_>) -> BufferingDecision;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "custom"
    }
}

/// Indices `current+1 ..= current+count`, clipped to the session.
fn window(current: usize, count: usize, total: usize) -> Vec<usize> {
    (current + 1..=current.saturating_add(count))
        .take_while(|i| *i < total)
        .collect()
}

// ============================================================================
// Heuristic
// ============================================================================

/// Default policy.
///
/// - warm start (progress < 10%): one chunk deeper than the base
/// - wind-down (progress > 90%): one chunk shallower
/// - more than two recent failures: immediate repair, one chunk shallower (at least 2)
#[derive(Debug, Clone)]
pub struct HeuristicStrategy {
    base_look_ahead: usize,
}

impl HeuristicStrategy {
    pub fn new(base_look_ahead: usize) -> Self {
        Self {
            base_look_ahead: base_look_ahead.max(1),
        }
    }

    pub fn base_look_ahead(&self) -> usize {
        self.base_look_ahead
    }
}

impl Default for HeuristicStrategy {
    fn default() -> Self {
        Self::new(3)
    }
}

impl BufferingStrategy for HeuristicStrategy {
    fn decide(&self, context: &StrategyContext<'_>) -> BufferingDecision {
        let progress = context.progress_ratio();
        let mut look_ahead = self.base_look_ahead;
        if progress < 0.1 {
            look_ahead = self.base_look_ahead + 1;
        } else if progress > 0.9 {
            look_ahead = self.base_look_ahead.saturating_sub(1).max(1);
        }

        let repair_mode = if context.recent_failures > 2 {
            look_ahead = look_ahead.saturating_sub(1).max(2);
            RepairMode::Immediate
        } else {
            RepairMode::Background
        };

        BufferingDecision {
            look_ahead_count: look_ahead,
            priority_indices: window(context.current_chunk, look_ahead, context.total_chunks),
            repair_mode,
        }
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

// ============================================================================
// Pattern-aware
// ============================================================================

const UNRELIABLE_RATE: f64 = 0.5;
const SKIP_RATE: f64 = 0.8;
const FREQUENT_SEEKS_PER_MINUTE: f64 = 2.0;

/// Aggregated statistics from earlier sessions over the same chunk source.
///
/// Produced outside the engine; the engine only reads it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionHistory {
    /// Fraction of past attempts that failed, per chunk index
    #[serde(default)]
    pub chunk_failure_rates: HashMap<usize, f64>,
    #[serde(default)]
    pub seeks_per_minute: f64,
    #[serde(default)]
    pub sessions_observed: u32,
}

impl SessionHistory {
    pub fn failure_rate(&self, chunk_index: usize) -> f64 {
        self.chunk_failure_rates
            .get(&chunk_index)
            .copied()
            .unwrap_or(0.0)
    }
}

/// Heuristic refined by historical session patterns.
///
/// Historically unreliable chunks in the window are fetched first so they
/// have the most time to recover, and their presence escalates the repair
/// mode. Listeners who seek a lot get a shallower window.
#[derive(Debug, Clone, Default)]
pub struct PatternAwareStrategy {
    inner: HeuristicStrategy,
    history: SessionHistory,
}

impl PatternAwareStrategy {
    pub fn new(inner: HeuristicStrategy, history: SessionHistory) -> Self {
        Self { inner, history }
    }

    pub fn history(&self) -> &SessionHistory {
        &self.history
    }
}

impl BufferingStrategy for PatternAwareStrategy {
    fn decide(&self, context: &StrategyContext<'_>) -> BufferingDecision {
        let mut decision = self.inner.decide(context);

        let seeky = context.behavior == ListeningBehavior::Seeking
            || self.history.seeks_per_minute > FREQUENT_SEEKS_PER_MINUTE;
        if seeky && decision.look_ahead_count > 1 {
            decision.look_ahead_count -= 1;
            decision.priority_indices.truncate(decision.look_ahead_count);
        }

        let rate = |i: &usize| self.history.failure_rate(*i);
        if decision.priority_indices.iter().any(|i| rate(i) > SKIP_RATE) {
            decision.repair_mode = RepairMode::Skip;
        } else if decision.priority_indices.iter().any(|i| rate(i) > UNRELIABLE_RATE) {
            decision.repair_mode = RepairMode::Immediate;
        }

        // stable: unreliable first, otherwise playback order
        decision
            .priority_indices
            .sort_by_key(|i| rate(i) <= UNRELIABLE_RATE);

        decision
    }

    fn name(&self) -> &str {
        "pattern-aware"
    }
}
