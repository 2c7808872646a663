//! Index entries
//!
//! Fixed-size `(segment, end_offset)` records, one per item plus a
//! leading sentinel.

use std::fs::File;

use super::segment::read_exact_at;
use crate::error::Result;

/// Size of one encoded index entry: Segment (4) + Offset (4)
pub const INDEX_ENTRY_SIZE: u64 = 8;

/// Pointer to the end of an item inside a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexEntry {
    /// Segment holding the item
    pub segment: u32,

    /// Offset one past the item's last byte
    pub offset: u32,
}

impl IndexEntry {
    /// The entry every index starts with
    pub const SENTINEL: IndexEntry = IndexEntry {
        segment: 0,
        offset: 0,
    };

    pub fn new(segment: u32, offset: u32) -> Self {
        Self { segment, offset }
    }

    /// Encode to the 8-byte on-disk form (big-endian)
    pub fn encode(&self) -> [u8; INDEX_ENTRY_SIZE as usize] {
        let mut buf = [0u8; INDEX_ENTRY_SIZE as usize];
        buf[0..4].copy_from_slice(&self.segment.to_be_bytes());
        buf[4..8].copy_from_slice(&self.offset.to_be_bytes());
        buf
    }

    /// Decode from the 8-byte on-disk form
    pub fn decode(buf: &[u8; INDEX_ENTRY_SIZE as usize]) -> Self {
        Self {
            segment: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            offset: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }

    /// Byte range of the item ending at `self`, given the previous entry.
    ///
    /// Returns `(segment, start, end)`. An item that opens a new segment
    /// starts at 0.
    pub fn bounds(&self, previous: &IndexEntry) -> (u32, u64, u64) {
        let start = if previous.segment == self.segment {
            previous.offset as u64
        } else {
            0
        };
        (self.segment, start, self.offset as u64)
    }
}

/// Read entry `n` (0 is the sentinel) from an index file
pub(crate) fn read_entry(index: &File, n: u64) -> Result<IndexEntry> {
    let mut buf = [0u8; INDEX_ENTRY_SIZE as usize];
    read_exact_at(index, &mut buf, n * INDEX_ENTRY_SIZE)?;
    Ok(IndexEntry::decode(&buf))
}

/// Read `count` consecutive entries starting at entry `first`
pub(crate) fn read_entries(index: &File, first: u64, count: u64) -> Result<Vec<IndexEntry>> {
    let mut buf = vec![0u8; (count * INDEX_ENTRY_SIZE) as usize];
    read_exact_at(index, &mut buf, first * INDEX_ENTRY_SIZE)?;

    Ok(buf
        .chunks_exact(INDEX_ENTRY_SIZE as usize)
        .map(|chunk| {
            let mut raw = [0u8; INDEX_ENTRY_SIZE as usize];
            raw.copy_from_slice(chunk);
            IndexEntry::decode(&raw)
        })
        .collect())
}

// =============================================================================
// Tests
// =============================================================================
