//! KV log records
//!
//! Defines the structure of individual log records.

use serde::{Deserialize, Serialize};

use crate::error::{AncientError, Result};

/// Record header size: Len (4) + CRC (4)
pub const HEADER_SIZE: usize = 8;

/// Records larger than this are treated as corruption (64 MB)
const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

impl Operation {
    pub fn key(&self) -> &[u8] {
        match self {
            Operation::Put { key, .. } | Operation::Delete { key } => key,
        }
    }
}

/// One framed, checksummed operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub operation: Operation,
}

impl LogRecord {
    pub fn new(operation: Operation) -> Self {
        Self { operation }
    }

    /// Frame as `[len][crc][payload]`
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(&self.operation)
            .map_err(|e| AncientError::Serialization(e.to_string()))?;
        let crc = crc32fast::hash(&payload);

        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&crc.to_le_bytes());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode the record at the start of `bytes`
    ///
    /// Returns:
    /// - `Ok(Some((record, consumed)))`: a valid record
    /// - `Ok(None)`: `bytes` ends inside the record (torn write)
    /// - `Err(KvCorruption)`: checksum or payload is bad
    pub fn deserialize(bytes: &[u8]) -> Result<Option<(Self, usize)>> {
        if bytes.len() < HEADER_SIZE {
            return Ok(None);
        }

        let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let crc = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);

        if len > MAX_RECORD_SIZE {
            return Err(AncientError::KvCorruption(format!(
                "record length {} exceeds maximum {}",
                len, MAX_RECORD_SIZE
            )));
        }
        if bytes.len() < HEADER_SIZE + len {
            return Ok(None);
        }

        let payload = &bytes[HEADER_SIZE..HEADER_SIZE + len];
        let actual = crc32fast::hash(payload);
        if actual != crc {
            return Err(AncientError::KvCorruption(format!(
                "CRC mismatch: expected {:08x}, got {:08x}",
                crc, actual
            )));
        }

        let operation: Operation = bincode::deserialize(payload)
            .map_err(|e| AncientError::KvCorruption(format!("bad payload: {}", e)))?;

        Ok(Some((Self { operation }, HEADER_SIZE + len)))
    }
}

// =============================================================================
// Tests
// =============================================================================
