//! # Reliability Tracker
//!
//! Per-chunk running estimate of fetch/decode success, scoped to one
//! session. Scores start neutral, rise slowly on success and fall fast on
//! failure; a chunk below the skip threshold is skip-eligible.

use crate::config::ReliabilityConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Serializable export of a tracker, stored through the host
/// `ReliabilityStore` between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilitySnapshot {
    pub source_key: String,
    pub scores: BTreeMap<usize, f64>,
    pub updated_at_ms: i64,
}

#[derive(Debug, Clone)]
pub struct ReliabilityTracker {
    config: ReliabilityConfig,
    scores: HashMap<usize, f64>,
}

impl ReliabilityTracker {
    pub fn new(config: ReliabilityConfig) -> Self {
        Self {
            config,
            scores: HashMap::new(),
        }
    }

    /// Apply one fetch/decode outcome and return the new score.
    pub fn record_outcome(&mut self, chunk_index: usize, success: bool) -> f64 {
        let current = self.score(chunk_index);
        let next = if success {
            (current + self.config.success_step).min(self.config.ceiling)
        } else {
            (current - self.config.failure_step).max(self.config.floor)
        };
        self.scores.insert(chunk_index, next);
        next
    }

    pub fn score(&self, chunk_index: usize) -> f64 {
        self.scores
            .get(&chunk_index)
            .copied()
            .unwrap_or(self.config.default_score)
    }

    pub fn should_skip(&self, chunk_index: usize) -> bool {
        self.score(chunk_index) < self.config.skip_threshold
    }

    /// Below the neutral default: fetched last, or not at all in skip repair mode.
    pub fn is_deprioritized(&self, chunk_index: usize) -> bool {
        self.score(chunk_index) < self.config.default_score
    }

    /// Number of chunks with at least one recorded outcome.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn reset(&mut self) {
        self.scores.clear();
    }

    pub fn export(&self, source_key: &str, updated_at_ms: i64) -> ReliabilitySnapshot {
        ReliabilitySnapshot {
            source_key: source_key.to_string(),
            scores: self.scores.iter().map(|(k, v)| (*k, *v)).collect(),
            updated_at_ms,
        }
    }

    /// Seed scores from a stored snapshot.
    ///
    /// Values are clamped into `[floor, ceiling]`; non-finite values are
    /// dropped.
    pub fn import(&mut self, snapshot: &ReliabilitySnapshot) {
        for (index, score) in &snapshot.scores {
            if score.is_finite() {
                self.scores.insert(
                    *index,
                    score.clamp(self.config.floor, self.config.ceiling),
                );
            }
        }
    }
}

impl Default for ReliabilityTracker {
    fn default() -> Self {
        Self::new(ReliabilityConfig::default())
    }
}
