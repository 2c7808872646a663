//! Item codecs
//!
//! A table stores either verbatim items or zstd frames. The choice is made
//! when the table is created and is recorded in its file extensions.

use crate::error::{AncientError, Result};

/// zstd level used for item compression (0 = library default)
const ZSTD_LEVEL: i32 = 0;

/// Encodes and decodes single items
pub trait Codec: Send + Sync {
    /// Encode raw item bytes for storage
    fn encode(&self, item: &[u8]) -> Result<Vec<u8>>;

    /// Decode stored bytes back to the original item
    fn decode(&self, stored: &[u8]) -> Result<Vec<u8>>;
}

/// Stores items verbatim
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl Codec for RawCodec {
    fn encode(&self, item: &[u8]) -> Result<Vec<u8>> {
        Ok(item.to_vec())
    }

    fn decode(&self, stored: &[u8]) -> Result<Vec<u8>> {
        Ok(stored.to_vec())
    }
}

/// Stores each item as an independent zstd frame
#[derive(Debug, Clone, Copy, Default)]
pub struct ZstdCodec;

impl Codec for ZstdCodec {
    fn encode(&self, item: &[u8]) -> Result<Vec<u8>> {
        zstd::bulk::compress(item, ZSTD_LEVEL)
            .map_err(|e| AncientError::Serialization(format!("zstd compress failed: {}", e)))
    }

    fn decode(&self, stored: &[u8]) -> Result<Vec<u8>> {
        zstd::stream::decode_all(stored).map_err(|e| AncientError::DecodeFailure(e.to_string()))
    }
}

/// Per-table compression choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Items stored verbatim (`.ridx` / `.rdat`)
    None,

    /// Items stored as zstd frames (`.cidx` / `.cdat`)
    Zstd,
}

impl Compression {
    pub fn is_compressed(self) -> bool {
        matches!(self, Compression::Zstd)
    }

    /// The codec implementing this choice
    pub fn codec(self) -> &'static dyn Codec {
        match self {
            Compression::None => &RawCodec,
            Compression::Zstd => &ZstdCodec,
        }
    }

    /// Extension of the index file
    pub(crate) fn index_extension(self) -> &'static str {
        match self {
            Compression::None => "ridx",
            Compression::Zstd => "cidx",
        }
    }

    /// Extension of segment files
    pub(crate) fn segment_extension(self) -> &'static str {
        match self {
            Compression::None => "rdat",
            Compression::Zstd => "cdat",
        }
    }

    pub(crate) fn other(self) -> Compression {
        match self {
            Compression::None => Compression::Zstd,
            Compression::Zstd => Compression::None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
