//! # Chunk Descriptor Table
//!
//! Static per-session metadata: the ordered list of chunks, their locators
//! and nominal durations.

use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One independently fetchable segment of the recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    /// Stable chunk identity (content id or similar)
    pub id: String,
    /// Opaque address handed to the fetch capability
    pub locator: String,
    /// Position in the recording, contiguous from 0
    pub sequence: usize,
    /// Expected playable duration in seconds
    pub nominal_duration: f64,
    /// Set on the last chunk of a closed recording
    #[serde(default)]
    pub is_final: bool,
}

impl ChunkDescriptor {
    pub fn new(
        id: impl Into<String>,
        locator: impl Into<String>,
        sequence: usize,
        nominal_duration: f64,
    ) -> Self {
        Self {
            id: id.into(),
            locator: locator.into(),
            sequence,
            nominal_duration,
            is_final: false,
        }
    }

    /// Mark this descriptor as the final chunk.
    pub fn final_chunk(mut self) -> Self {
        self.is_final = true;
        self
    }
}

/// Validated, sequence-ordered descriptors for one session.
///
/// A table without a final chunk describes a live recording that may be
/// extended with [`DescriptorTable::extend`].
#[derive(Debug, Clone, Default)]
pub struct DescriptorTable {
    chunks: Vec<ChunkDescriptor>,
}

impl DescriptorTable {
    /// Sort and validate a descriptor list.
    ///
    /// # Errors
    ///
    /// `InvalidDescriptors` when the list is empty, sequences are not a
    /// contiguous `0..N` range, a duration is not positive, or the final flag
    /// is set anywhere but the last chunk.
    pub fn new(mut descriptors: Vec<ChunkDescriptor>) -> Result<Self> {
        if descriptors.is_empty() {
            return Err(PlaybackError::InvalidDescriptors(
                "descriptor list is empty".to_string(),
            ));
        }

        descriptors.sort_by_key(|d| d.sequence);
        validate_run(&descriptors, 0)?;

        Ok(Self {
            chunks: descriptors,
        })
    }

    /// Append newly published chunks to a live table.
    ///
    /// The appended sequences must continue where the table ends. Once a
    /// final chunk has been appended the table is closed.
    pub fn extend(&mut self, mut descriptors: Vec<ChunkDescriptor>) -> Result<()> {
        if !self.is_live() {
            return Err(PlaybackError::InvalidDescriptors(
                "session already has a final chunk".to_string(),
            ));
        }
        if descriptors.is_empty() {
            return Ok(());
        }

        descriptors.sort_by_key(|d| d.sequence);
        validate_run(&descriptors, self.chunks.len())?;
        self.chunks.extend(descriptors);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ChunkDescriptor> {
        self.chunks.get(index)
    }

    pub fn descriptors(&self) -> &[ChunkDescriptor] {
        &self.chunks
    }

    /// `true` while no chunk is flagged final.
    pub fn is_live(&self) -> bool {
        !self.chunks.last().map_or(false, |c| c.is_final)
    }

    pub fn last_index(&self) -> Option<usize> {
        self.chunks.len().checked_sub(1)
    }

    /// Identity of the chunk source, used as the reliability store key.
    ///
    /// Hex SHA-256 over the chunk ids joined by newlines.
    pub fn source_key(&self) -> String {
        let mut hasher = Sha256::new();
        for (i, chunk) in self.chunks.iter().enumerate() {
            if i > 0 {
                hasher.update(b"\n");
            }
            hasher.update(chunk.id.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

fn validate_run(descriptors: &[ChunkDescriptor], first_sequence: usize) -> Result<()> {
    let last = descriptors.len() - 1;
    for (offset, descriptor) in descriptors.iter().enumerate() {
        let expected = first_sequence + offset;
        if descriptor.sequence != expected {
            return Err(PlaybackError::InvalidDescriptors(format!(
                "expected sequence {} but found {} (sequences must be unique and contiguous)",
                expected, descriptor.sequence
            )));
        }
        if descriptor.id.is_empty() {
            return Err(PlaybackError::InvalidDescriptors(format!(
                "chunk {} has an empty id",
                expected
            )));
        }
        if !descriptor.nominal_duration.is_finite() || descriptor.nominal_duration <= 0.0 {
            return Err(PlaybackError::InvalidDescriptors(format!(
                "chunk {} has non-positive duration {}",
                expected, descriptor.nominal_duration
            )));
        }
        if descriptor.is_final && offset != last {
            return Err(PlaybackError::InvalidDescriptors(format!(
                "chunk {} is marked final but is not the last chunk",
                expected
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(seq: usize, duration: f64) -> ChunkDescriptor {
        ChunkDescriptor::new(format!("c{}", seq), format!("https://cdn.example/c{}", seq), seq, duration)
    }

    #[test]
    fn test_sorts_by_sequence() {
        let table = DescriptorTable::new(vec![
            chunk(2, 45.0).final_chunk(),
            chunk(0, 60.0),
            chunk(1, 60.0),
        ])
        .unwrap();

        let ids: Vec<_> = table.descriptors().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["c0", "c1", "c2"]);
        assert!(!table.is_live());
        assert_eq!(table.last_index(), Some(2));
    }

    #[test]
    fn test_rejects_invalid_lists() {
        assert!(DescriptorTable::new(vec![]).is_err());
        // gap
        assert!(DescriptorTable::new(vec![chunk(0, 60.0), chunk(2, 60.0)]).is_err());
        // duplicate
        assert!(DescriptorTable::new(vec![chunk(0, 60.0), chunk(0, 60.0)]).is_err());
        assert!(DescriptorTable::new(vec![chunk(0, 0.0)]).is_err());
        assert!(DescriptorTable::new(vec![chunk(0, f64::NAN)]).is_err());
        // final not last
        assert!(DescriptorTable::new(vec![chunk(0, 60.0).final_chunk(), chunk(1, 60.0)]).is_err());
    }

    #[test]
    fn test_extend_live_table() {
        let mut table = DescriptorTable::new(vec![chunk(0, 60.0), chunk(1, 60.0)]).unwrap();
        assert!(table.is_live());

        assert!(table.extend(vec![chunk(3, 60.0)]).is_err());
        table.extend(vec![chunk(2, 30.0).final_chunk()]).unwrap();

        assert_eq!(table.len(), 3);
        assert!(!table.is_live());
        assert!(table.extend(vec![chunk(3, 60.0)]).is_err());
    }

    #[test]
    fn test_source_key_depends_on_ids() {
        let a = DescriptorTable::new(vec![chunk(0, 60.0), chunk(1, 60.0)]).unwrap();
        let b = DescriptorTable::new(vec![chunk(0, 30.0), chunk(1, 30.0)]).unwrap();
        let c = DescriptorTable::new(vec![chunk(0, 60.0)]).unwrap();

        assert_eq!(a.source_key(), b.source_key());
        assert_ne!(a.source_key(), c.source_key());
        assert_eq!(a.source_key().len(), 64);
    }
}
