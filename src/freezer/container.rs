//! Freezer container
//!
//! Owns a fixed set of parallel tables that must always hold the same
//! number of items.
//!
//! ## Responsibilities
//! - Open (and, when writable, repair) every configured table
//! - Verify the equal-length invariant on sync
//! - Multi-table row batches with all-or-nothing rollback
//! - Explicit truncation to a common length

use std::collections::BTreeMap;
use std::fs;

use tracing::{error, info, warn};

use super::FreezerTable;
use crate::config::FreezerConfig;
use crate::error::{AncientError, Result};

/// A container of parallel append-only tables
#[derive(Debug)]
pub struct Freezer {
    config: FreezerConfig,
    /// Table name → table, in name order
    tables: BTreeMap<String, FreezerTable>,
}

impl Freezer {
    /// Open every table listed in `config`
    ///
    /// Writable containers repair each table's trailing inconsistencies.
    /// Differing lengths between tables are left alone here; `sync()`
    /// reports them.
    pub fn open(config: FreezerConfig) -> Result<Self> {
        if config.tables.is_empty() {
            return Err(AncientError::Config(
                "freezer needs at least one table".to_string(),
            ));
        }
        if config.segment_capacity == 0 {
            return Err(AncientError::Config(
                "segment capacity must be positive".to_string(),
            ));
        }
        if !config.read_only {
            fs::create_dir_all(&config.data_dir)?;
        }

        let mut tables = BTreeMap::new();
        for (name, compression) in &config.tables {
            let options = config.table_options(*compression);
            let table = FreezerTable::open(&config.data_dir, name, options)?;
            tables.insert(name.clone(), table);
        }

        let freezer = Self { config, tables };
        let lengths = freezer.lengths();
        if !all_equal(&lengths) {
            warn!(lengths = ?lengths, "Freezer tables have diverging lengths");
        }
        info!(
            data_dir = %freezer.config.data_dir.display(),
            tables = freezer.tables.len(),
            "Opened freezer"
        );

        Ok(freezer)
    }

    /// Look up a table by name
    pub fn table(&self, name: &str) -> Result<&FreezerTable> {
        self.tables
            .get(name)
            .ok_or_else(|| AncientError::UnknownTable(name.to_string()))
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn config(&self) -> &FreezerConfig {
        &self.config
    }

    /// `(name, length)` for every table, in name order
    pub fn lengths(&self) -> Vec<(String, u64)> {
        self.tables
            .iter()
            .map(|(name, table)| (name.clone(), table.len()))
            .collect()
    }

    /// The common item count of all tables
    pub fn ancients(&self) -> Result<u64> {
        let lengths = self.lengths();
        if !all_equal(&lengths) {
            return Err(AncientError::TableLengthMismatch(lengths));
        }
        Ok(lengths.first().map(|(_, len)| *len).unwrap_or(0))
    }

    /// Total bytes on disk across all tables
    pub fn size(&self) -> Result<u64> {
        let mut total = 0;
        for table in self.tables.values() {
            total += table.size()?;
        }
        Ok(total)
    }

    /// fsync every table, then verify they all hold the same number of items
    pub fn sync(&self) -> Result<()> {
        for table in self.tables.values() {
            table.sync()?;
        }

        let lengths = self.lengths();
        if !all_equal(&lengths) {
            error!(lengths = ?lengths, "Freezer tables out of step");
            return Err(AncientError::TableLengthMismatch(lengths));
        }
        Ok(())
    }

    /// Truncate every table to at most `items` items
    pub fn truncate_head(&self, items: u64) -> Result<()> {
        if self.config.read_only {
            return Err(AncientError::ReadOnly("freezer".to_string()));
        }
        for table in self.tables.values() {
            table.truncate_to(items)?;
        }
        info!(items, "Truncated freezer head");
        Ok(())
    }

    /// Start a multi-table row batch
    pub fn new_batch(&self) -> FreezerBatch<'_> {
        FreezerBatch {
            freezer: self,
            staged: BTreeMap::new(),
            committed: false,
        }
    }

    /// Close every table
    pub fn close(&self) {
        for table in self.tables.values() {
            table.close();
        }
        info!(data_dir = %self.config.data_dir.display(), "Closed freezer");
    }
}

/// Items staged across the tables of a `Freezer`
///
/// On commit every table must receive the same number of items. If any
/// table fails, all tables are truncated back to the pre-batch length.
pub struct FreezerBatch<'a> {
    freezer: &'a Freezer,
    staged: BTreeMap<String, Vec<Vec<u8>>>,
    committed: bool,
}

impl FreezerBatch<'_> {
    /// Stage one item for `table`
    pub fn append(&mut self, table: &str, item: &[u8]) -> Result<()> {
        if self.committed {
            return Err(AncientError::BatchClosed);
        }
        self.freezer.table(table)?.ensure_writable()?;

        self.staged
            .entry(table.to_string())
            .or_default()
            .push(item.to_vec());
        Ok(())
    }

    /// Commit every table's items; returns the new common length
    pub fn commit(&mut self) -> Result<u64> {
        if self.committed {
            return Err(AncientError::BatchClosed);
        }
        self.committed = true;

        let checkpoint = self.freezer.ancients()?;

        let staged: Vec<(String, u64)> = self
            .freezer
            .table_names()
            .map(|name| {
                let count = self.staged.get(name).map(Vec::len).unwrap_or(0) as u64;
                (name.to_string(), checkpoint + count)
            })
            .collect();
        if !all_equal(&staged) {
            return Err(AncientError::TableLengthMismatch(staged));
        }

        for (name, table) in &self.freezer.tables {
            let Some(items) = self.staged.get(name) else {
                continue;
            };

            if let Err(e) = commit_table(table, items) {
                warn!(table = %name, checkpoint, error = %e, "Row batch failed, rolling back");
                return Err(match self.rollback(checkpoint) {
                    Ok(()) => e,
                    Err(rollback) => AncientError::RollbackFailed {
                        cause: Box::new(e),
                        rollback: Box::new(rollback),
                    },
                });
            }
        }

        self.freezer.ancients()
    }

    /// Truncate every table to `checkpoint`, returning the first failure
    fn rollback(&self, checkpoint: u64) -> Result<()> {
        let mut first = None;
        for (name, table) in &self.freezer.tables {
            if let Err(e) = table.truncate_to(checkpoint) {
                error!(table = %name, error = %e, "Failed to roll back table");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Number of items staged for `table`
    pub fn staged(&self, table: &str) -> usize {
        self.staged.get(table).map(Vec::len).unwrap_or(0)
    }
}

fn commit_table(table: &FreezerTable, items: &[Vec<u8>]) -> Result<u64> {
    let mut batch = table.new_batch();
    for item in items {
        batch.append_item(item)?;
    }
    batch.commit()
}

fn all_equal(lengths: &[(String, u64)]) -> bool {
    lengths.windows(2).all(|pair| pair[0].1 == pair[1].1)
}
