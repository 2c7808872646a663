//! Error types for ancientkv
//!
//! Provides a unified error type for freezer and key-value operations.

use thiserror::Error;

/// Result type alias using AncientError
pub type Result<T> = std::result::Result<T, AncientError>;

/// Unified error type for ancientkv operations
#[derive(Debug, Error)]
pub enum AncientError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Freezer Table Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt index for table '{table}': {reason}")]
    CorruptIndex { table: String, reason: String },

    #[error("Item {item} out of range (table holds {length} items)")]
    OutOfRange { item: u64, length: u64 },

    #[error("Table '{0}' is opened read-only")]
    ReadOnly(String),

    #[error("Batch already committed")]
    BatchClosed,

    #[error("Table '{0}' is closed")]
    Closed(String),

    #[error("Failed to decode item: {0}")]
    DecodeFailure(String),

    #[error("Table '{table}' exists on disk with compression={on_disk}, opened with compression={requested}")]
    CompressionMismatch {
        table: String,
        on_disk: bool,
        requested: bool,
    },

    #[error("Item of {size} bytes does not fit a segment offset")]
    ItemTooLarge { size: u64 },

    #[error("{cause}; rolling back also failed: {rollback}")]
    RollbackFailed {
        cause: Box<AncientError>,
        rollback: Box<AncientError>,
    },

    // -------------------------------------------------------------------------
    // Freezer Container Errors
    // -------------------------------------------------------------------------
    #[error("Table lengths differ: {}", format_lengths(.0))]
    TableLengthMismatch(Vec<(String, u64)>),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    // -------------------------------------------------------------------------
    // Key-Value Store Errors
    // -------------------------------------------------------------------------
    #[error("KV log corruption detected: {0}")]
    KvCorruption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

fn format_lengths(lengths: &[(String, u64)]) -> String {
    lengths
        .iter()
        .map(|(name, len)| format!("{}={}", name, len))
        .collect::<Vec<_>>()
        .join(", ")
}
