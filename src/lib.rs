//! # ancientkv
//!
//! Storage engines behind a node's maintenance tool:
//! - A freezer: segmented, append-only column tables for finalized data
//! - Atomic batched appends and crash repair by truncation
//! - A generic ordered key-value store (put/delete/compact)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ancientkv CLI                          │
//! │              (hex payloads, argument or stdin)               │
//! └──────────────┬───────────────────────────────┬──────────────┘
//!                │                               │
//!                ▼                               ▼
//!   ┌─────────────────────────┐        ┌─────────────────┐
//!   │        Freezer          │        │    LogStore     │
//!   │ (tables, equal length)  │        │   (KvStore)     │
//!   └────────────┬────────────┘        └─────────────────┘
//!                │
//!                ▼
//!   ┌─────────────────────────┐
//!   │     FreezerTable        │
//!   │  Batch → segments+index │
//!   │     Codec per table     │
//!   └─────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod freezer;
pub mod kv;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{AncientError, Result};
pub use config::{FreezerConfig, KvConfig, SyncPolicy, TableOptions};
pub use freezer::{Batch, Compression, Freezer, FreezerTable};
pub use kv::{KeyRange, KvStore, LogStore};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of ancientkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
