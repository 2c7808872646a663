//! Freezer Module
//!
//! Append-only, segmented column storage for finalized chain data.
//!
//! ## Responsibilities
//! - One `FreezerTable` per column: an index file plus numbered segments
//! - Atomic batched appends with segment rollover
//! - Crash repair by truncating to the last fully-indexed item
//! - A `Freezer` container keeping parallel tables at equal length
//!
//! ## File Format
//! ```text
//! {name}.ridx / {name}.cidx  (index)
//! ┌──────────────────────────────┐
//! │ Entry 0 (sentinel)           │
//! │ ┌────────────┬─────────────┐ │
//! │ │ Segment (4)│  Offset (4) │ │   big-endian, always (0, 0)
//! │ └────────────┴─────────────┘ │
//! ├──────────────────────────────┤
//! │ Entry i+1 = end of item i    │
//! │ ┌────────────┬─────────────┐ │
//! │ │ Segment (4)│  Offset (4) │ │
//! │ └────────────┴─────────────┘ │
//! └──────────────────────────────┘
//!
//! {name}.{NNNN}.rdat / .cdat  (segments)
//! ┌────────┬────────┬────────┬─────┐
//! │ item k │ item k+1 │ ...  │     │   raw or zstd-encoded bytes
//! └────────┴────────┴────────┴─────┘
//! ```

mod batch;
mod codec;
mod container;
mod index;
mod segment;
mod table;

pub use batch::Batch;
pub use codec::{Codec, Compression, RawCodec, ZstdCodec};
pub use container::{Freezer, FreezerBatch};
pub use index::{IndexEntry, INDEX_ENTRY_SIZE};
pub use segment::{index_file_name, segment_file_name};
pub use table::{FreezerTable, OpenReport, RepairReport, TableState};
