//! Configuration for ancientkv
//!
//! Centralized configuration with defaults matching the chain freezer.
//! Nothing here is global: every container and store receives its own
//! configuration value at open time.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::freezer::Compression;

/// Default maximum size of a single segment file (2 GB)
pub const DEFAULT_SEGMENT_CAPACITY: u64 = 2 * 1000 * 1000 * 1000;

/// Chain freezer table holding block headers
pub const HEADERS_TABLE: &str = "headers";

/// Chain freezer table holding canonical block hashes
pub const HASHES_TABLE: &str = "hashes";

/// Chain freezer table holding block bodies
pub const BODIES_TABLE: &str = "bodies";

/// Chain freezer table holding receipts
pub const RECEIPTS_TABLE: &str = "receipts";

/// Chain freezer table holding total difficulties
pub const DIFFICULTY_TABLE: &str = "diffs";

/// When table data is forced to stable storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// Only an explicit `sync()` fsyncs (caller decides)
    Manual,

    /// Every successful batch commit is followed by an fsync
    OnCommit,
}

/// Per-table settings used when opening a single `FreezerTable`
#[derive(Debug, Clone, Copy)]
pub struct TableOptions {
    /// Item codec, fixed when the table is first created
    pub compression: Compression,

    /// Soft upper bound on segment file size (in bytes)
    pub segment_capacity: u64,

    /// Open without write access; inconsistencies are reported, not repaired
    pub read_only: bool,

    /// Durability policy for batch commits
    pub sync_policy: SyncPolicy,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            compression: Compression::None,
            segment_capacity: DEFAULT_SEGMENT_CAPACITY,
            read_only: false,
            sync_policy: SyncPolicy::Manual,
        }
    }
}

impl TableOptions {
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn segment_capacity(mut self, capacity: u64) -> Self {
        self.segment_capacity = capacity;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.sync_policy = policy;
        self
    }
}

/// Main configuration for a freezer container
#[derive(Debug, Clone)]
pub struct FreezerConfig {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding every table's index and segment files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── headers.cidx         (index, compressed table)
    ///     ├── headers.0000.cdat    (segment 0)
    ///     ├── hashes.ridx          (index, raw table)
    ///     └── hashes.0000.rdat
    pub data_dir: PathBuf,

    /// Segment capacity shared by every table in the container
    pub segment_capacity: u64,

    // -------------------------------------------------------------------------
    // Table Configuration
    // -------------------------------------------------------------------------
    /// Table name → item codec
    pub tables: BTreeMap<String, Compression>,

    // -------------------------------------------------------------------------
    // Access Configuration
    // -------------------------------------------------------------------------
    /// Open every table read-only
    pub read_only: bool,

    /// Durability policy for batch commits
    pub sync_policy: SyncPolicy,
}

impl Default for FreezerConfig {
    fn default() -> Self {
        let tables = [
            (HEADERS_TABLE, Compression::Zstd),
            (HASHES_TABLE, Compression::None),
            (BODIES_TABLE, Compression::Zstd),
            (RECEIPTS_TABLE, Compression::Zstd),
            (DIFFICULTY_TABLE, Compression::None),
        ]
        .into_iter()
        .map(|(name, compression)| (name.to_string(), compression))
        .collect();

        Self {
            data_dir: PathBuf::from("./ancient"),
            segment_capacity: DEFAULT_SEGMENT_CAPACITY,
            tables,
            read_only: false,
            sync_policy: SyncPolicy::Manual,
        }
    }
}

impl FreezerConfig {
    /// Create a new config builder (starts from the chain table defaults)
    pub fn builder() -> FreezerConfigBuilder {
        FreezerConfigBuilder::default()
    }

    /// Options for opening one of this container's tables
    pub fn table_options(&self, compression: Compression) -> TableOptions {
        TableOptions {
            compression,
            segment_capacity: self.segment_capacity,
            read_only: self.read_only,
            sync_policy: self.sync_policy,
        }
    }
}

/// Builder for FreezerConfig
#[derive(Default)]
pub struct FreezerConfigBuilder {
    config: FreezerConfig,
}

impl FreezerConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the segment capacity (in bytes)
    pub fn segment_capacity(mut self, capacity: u64) -> Self {
        self.config.segment_capacity = capacity;
        self
    }

    /// Drop every configured table (start from an empty table map)
    pub fn clear_tables(mut self) -> Self {
        self.config.tables.clear();
        self
    }

    /// Add or replace a table
    pub fn table(mut self, name: impl Into<String>, compression: Compression) -> Self {
        self.config.tables.insert(name.into(), compression);
        self
    }

    /// Open tables read-only
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.config.read_only = read_only;
        self
    }

    /// Set the durability policy
    pub fn sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.config.sync_policy = policy;
        self
    }

    pub fn build(self) -> FreezerConfig {
        self.config
    }
}

/// Configuration for the key-value log store
#[derive(Debug, Clone)]
pub struct KvConfig {
    /// Root directory; the store lives in `{data_dir}/kv.log`
    pub data_dir: PathBuf,

    /// fsync after every put/delete
    pub sync_writes: bool,

    /// Open without write access
    pub read_only: bool,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./kvdata"),
            sync_writes: false,
            read_only: false,
        }
    }
}

impl KvConfig {
    /// Create a new config builder
    pub fn builder() -> KvConfigBuilder {
        KvConfigBuilder::default()
    }
}

/// Builder for KvConfig
#[derive(Default)]
pub struct KvConfigBuilder {
    config: KvConfig,
}

impl KvConfigBuilder {
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.config.sync_writes = sync;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.config.read_only = read_only;
        self
    }

    pub fn build(self) -> KvConfig {
        self.config
    }
}
