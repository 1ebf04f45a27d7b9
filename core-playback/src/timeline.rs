//! # Virtual Timeline
//!
//! Maps continuous playback time onto `(chunk, offset)` coordinates.
//!
//! Intervals are left-closed: a time exactly on a boundary belongs to the
//! chunk that starts there, so every point in `[0, total)` maps to exactly
//! one chunk. Lookups are a binary search over start times.

use crate::descriptor::ChunkDescriptor;
use crate::error::{PlaybackError, Result};

/// Derived timing for one chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineEntry {
    pub chunk_index: usize,
    /// Sum of the durations of all preceding chunks (seconds)
    pub start_time: f64,
    pub duration: f64,
}

impl TimelineEntry {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// A resolved timeline position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelinePosition {
    pub chunk_index: usize,
    /// Seconds into the chunk
    pub offset: f64,
}

#[derive(Debug, Clone, Default)]
pub struct VirtualTimeline {
    entries: Vec<TimelineEntry>,
    total: f64,
}

impl VirtualTimeline {
    /// Build the cumulative index from nominal durations.
    pub fn build(descriptors: &[ChunkDescriptor]) -> Self {
        let mut timeline = Self::default();
        timeline.extend(descriptors);
        timeline
    }

    /// Append entries for chunks added to a live session.
    pub fn extend(&mut self, descriptors: &[ChunkDescriptor]) {
        self.entries.reserve(descriptors.len());
        for descriptor in descriptors {
            self.entries.push(TimelineEntry {
                chunk_index: self.entries.len(),
                start_time: self.total,
                duration: descriptor.nominal_duration,
            });
            self.total += descriptor.nominal_duration;
        }
    }

    /// Resolve a playback time to a chunk and intra-chunk offset.
    ///
    /// # Errors
    ///
    /// `OutOfRange` when `time` is negative, not finite, or at/after the end
    /// of the timeline.
    pub fn locate(&self, time: f64) -> Result<TimelinePosition> {
        if !time.is_finite() || time < 0.0 || time >= self.total {
            return Err(PlaybackError::OutOfRange {
                time,
                total: self.total,
            });
        }

        // first entry starting after `time`, minus one
        let index = self
            .entries
            .partition_point(|entry| entry.start_time <= time)
            .saturating_sub(1);
        let entry = &self.entries[index];

        Ok(TimelinePosition {
            chunk_index: entry.chunk_index,
            offset: time - entry.start_time,
        })
    }

    /// Start time of a chunk.
    pub fn start_of(&self, chunk_index: usize) -> Result<f64> {
        self.entries
            .get(chunk_index)
            .map(|entry| entry.start_time)
            .ok_or(PlaybackError::ChunkIndexOutOfRange {
                index: chunk_index,
                len: self.entries.len(),
            })
    }

    pub fn entry(&self, chunk_index: usize) -> Option<&TimelineEntry> {
        self.entries.get(chunk_index)
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn total_duration(&self) -> f64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
