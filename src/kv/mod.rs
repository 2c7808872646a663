//! Key-Value Store Module
//!
//! The generic sorted store used next to the freezer.
//!
//! ## Responsibilities
//! - `KvStore`: the boundary the tool needs (get/put/delete/compact)
//! - `LogStore`: an append-only, checksummed log replayed into an ordered map
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Record 1                                │
//! │ ┌─────────┬─────────┬────────────────┐  │
//! │ │ Len (4) │ CRC (4) │ bincode(Op)    │  │
//! │ └─────────┴─────────┴────────────────┘  │
//! ├─────────────────────────────────────────┤
//! │ Record 2 ...                            │
//! └─────────────────────────────────────────┘
//! ```

mod entry;
mod store;

pub use entry::{LogRecord, Operation, HEADER_SIZE};
pub use store::{CompactionStats, LogStore};

use crate::error::Result;

/// Key range for compaction: `start` inclusive, `limit` exclusive,
/// `None` meaning unbounded on that side
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Option<Vec<u8>>,
    pub limit: Option<Vec<u8>>,
}

impl KeyRange {
    /// The whole key space
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(start: Option<Vec<u8>>, limit: Option<Vec<u8>>) -> Self {
        Self { start, limit }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        let after_start = self.start.as_deref().map_or(true, |start| key >= start);
        let before_limit = self.limit.as_deref().map_or(true, |limit| key < limit);
        after_start && before_limit
    }
}

/// Ordered byte-string map with durable mutations
pub trait KvStore {
    /// Value stored under `key`, if any
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove `key` (no-op if absent)
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Reclaim space held by overwritten and deleted keys within `range`
    fn compact(&self, range: &KeyRange) -> Result<CompactionStats>;
}

// =============================================================================
// Tests
// =============================================================================
