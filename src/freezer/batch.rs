//! Batch
//!
//! Stages appends for one table and commits them as a unit.

use super::FreezerTable;
use crate::error::{AncientError, Result};

/// Items staged for a single `FreezerTable`
///
/// Items are encoded when staged. `commit()` either indexes every staged
/// item or leaves the table at its pre-batch length. A batch is single-use.
pub struct Batch<'a> {
    table: &'a FreezerTable,
    /// Encoded items, in staging order
    staged: Vec<Vec<u8>>,
    /// Bytes staged so far (encoded)
    staged_bytes: u64,
    committed: bool,
}

impl<'a> Batch<'a> {
    pub(crate) fn new(table: &'a FreezerTable) -> Self {
        Self {
            table,
            staged: Vec::new(),
            staged_bytes: 0,
            committed: false,
        }
    }

    /// Stage one item
    pub fn append_item(&mut self, item: &[u8]) -> Result<()> {
        if self.committed {
            return Err(AncientError::BatchClosed);
        }
        self.table.ensure_writable()?;

        let encoded = self.table.codec().encode(item)?;
        self.staged_bytes += encoded.len() as u64;
        self.staged.push(encoded);
        Ok(())
    }

    /// Write every staged item and index it; returns the table's new length
    ///
    /// Durability beyond OS buffering needs `FreezerTable::sync()` unless the
    /// table uses `SyncPolicy::OnCommit`.
    pub fn commit(&mut self) -> Result<u64> {
        if self.committed {
            return Err(AncientError::BatchClosed);
        }
        self.committed = true;

        let staged = std::mem::take(&mut self.staged);
        self.staged_bytes = 0;
        self.table.commit_items(&staged)
    }

    /// Number of staged items
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Encoded bytes staged so far
    pub fn staged_bytes(&self) -> u64 {
        self.staged_bytes
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }
}
