//! Listener behaviour classification fed to the buffering strategy.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

const DEFAULT_WINDOW: Duration = Duration::from_secs(30);
const SEEKING_THRESHOLD: usize = 3;
const INTERRUPTED_THRESHOLD: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListeningBehavior {
    Continuous,
    Seeking,
    Interrupted,
}

/// Sliding-window counter of seeks and interruptions (pauses and stops).
///
/// Timestamps are monotonic clock readings supplied by the caller.
#[derive(Debug, Clone)]
pub struct BehaviorTracker {
    window: Duration,
    seeks: VecDeque<Duration>,
    interruptions: VecDeque<Duration>,
}

impl BehaviorTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seeks: VecDeque::new(),
            interruptions: VecDeque::new(),
        }
    }

    pub fn record_seek(&mut self, now: Duration) {
        self.seeks.push_back(now);
        self.prune(now);
    }

    pub fn record_interruption(&mut self, now: Duration) {
        self.interruptions.push_back(now);
        self.prune(now);
    }

    pub fn classify(&mut self, now: Duration) -> ListeningBehavior {
        self.prune(now);
        if self.seeks.len() >= SEEKING_THRESHOLD {
            ListeningBehavior::Seeking
        } else if self.interruptions.len() >= INTERRUPTED_THRESHOLD {
            ListeningBehavior::Interrupted
        } else {
            ListeningBehavior::Continuous
        }
    }

    pub fn reset(&mut self) {
        self.seeks.clear();
        self.interruptions.clear();
    }

    fn prune(&mut self, now: Duration) {
        let cutoff = now.saturating_sub(self.window);
        for queue in [&mut self.seeks, &mut self.interruptions] {
            while queue.front().map_or(false, |t| *t < cutoff) {
                queue.pop_front();
            }
        }
    }
}

impl Default for BehaviorTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
