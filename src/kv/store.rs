//! Log Store
//!
//! `KvStore` backed by a single append-only log replayed into a BTreeMap.
//!
//! ## Concurrency
//! - One `RwLock` over the map and the log handle
//! - Writers append to the log before touching the map

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::{KeyRange, KvStore, LogRecord, Operation};
use crate::config::KvConfig;
use crate::error::{AncientError, Result};

/// Outcome of a compaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionStats {
    pub records_before: u64,
    pub records_after: u64,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

struct StoreInner {
    /// Append handle; `None` when read-only
    log: Option<File>,
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

/// Append-only log backed key-value store
pub struct LogStore {
    config: KvConfig,
    path: PathBuf,
    inner: RwLock<StoreInner>,
}

impl LogStore {
    const LOG_FILENAME: &'static str = "kv.log";
    const COMPACT_FILENAME: &'static str = "kv.log.compact";

    /// Open or create the store, replaying the log
    ///
    /// A torn or corrupt tail is cut off in writable mode and reported as
    /// `KvCorruption` in read-only mode.
    pub fn open(config: KvConfig) -> Result<Self> {
        let path = config.data_dir.join(Self::LOG_FILENAME);

        if !config.read_only {
            fs::create_dir_all(&config.data_dir)?;
        }

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !config.read_only => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let (records, valid_len) = replay(&bytes);
        let mut data = BTreeMap::new();
        for record in &records {
            apply(&mut data, &record.operation);
        }

        let log = if config.read_only {
            if valid_len < bytes.len() {
                return Err(AncientError::KvCorruption(format!(
                    "{} trailing bytes after record {}",
                    bytes.len() - valid_len,
                    records.len()
                )));
            }
            None
        } else {
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            if valid_len < bytes.len() {
                warn!(
                    path = %path.display(),
                    dropped_bytes = bytes.len() - valid_len,
                    "Truncating damaged KV log tail"
                );
                file.set_len(valid_len as u64)?;
                file.sync_all()?;
            }
            Some(file)
        };

        info!(
            path = %path.display(),
            records = records.len(),
            keys = data.len(),
            "Opened KV store"
        );

        Ok(Self {
            config,
            path,
            inner: RwLock::new(StoreInner { log, data }),
        })
    }

    /// Open with a directory (convenience method)
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(KvConfig::builder().data_dir(path).build())
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.inner.read().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path of the log file
    pub fn log_path(&self) -> &Path {
        &self.path
    }

    /// Live entries whose keys fall in `range`, in key order
    pub fn scan(&self, range: &KeyRange) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.inner
            .read()
            .data
            .iter()
            .filter(|(key, _)| range.contains(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// fsync the log
    pub fn sync(&self) -> Result<()> {
        if let Some(log) = self.inner.read().log.as_ref() {
            log.sync_all()?;
        }
        Ok(())
    }

    fn append(&self, operation: Operation) -> Result<()> {
        let mut inner = self.inner.write();
        let log = inner
            .log
            .as_mut()
            .ok_or_else(|| AncientError::ReadOnly("kv".to_string()))?;

        let bytes = LogRecord::new(operation.clone()).serialize()?;
        log.write_all(&bytes)?;
        if self.config.sync_writes {
            log.sync_all()?;
        }

        apply(&mut inner.data, &operation);
        Ok(())
    }
}

impl KvStore for LogStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.read().data.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.append(Operation::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        })
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.append(Operation::Delete { key: key.to_vec() })
    }

    /// Rewrite the log: inside `range` only the live value of each key
    /// survives; records outside it are copied unchanged.
    fn compact(&self, range: &KeyRange) -> Result<CompactionStats> {
        let mut inner = self.inner.write();
        if inner.log.is_none() {
            return Err(AncientError::ReadOnly("kv".to_string()));
        }

        let mut bytes = Vec::new();
        File::open(&self.path)?.read_to_end(&mut bytes)?;
        let (records, _) = replay(&bytes);

        let mut kept: Vec<LogRecord> = records
            .iter()
            .filter(|record| !range.contains(record.operation.key()))
            .cloned()
            .collect();
        kept.extend(
            inner
                .data
                .iter()
                .filter(|(key, _)| range.contains(key))
                .map(|(key, value)| {
                    LogRecord::new(Operation::Put {
                        key: key.clone(),
                        value: value.clone(),
                    })
                }),
        );

        let compact_path = self.config.data_dir.join(Self::COMPACT_FILENAME);
        let mut bytes_after = 0u64;
        {
            let mut file = File::create(&compact_path)?;
            for record in &kept {
                let framed = record.serialize()?;
                file.write_all(&framed)?;
                bytes_after += framed.len() as u64;
            }
            file.sync_all()?;
        }

        // Release the old handle before replacing the file it points at
        inner.log = None;
        let renamed = fs::rename(&compact_path, &self.path);
        inner.log = Some(OpenOptions::new().append(true).open(&self.path)?);
        renamed?;

        let stats = CompactionStats {
            records_before: records.len() as u64,
            records_after: kept.len() as u64,
            bytes_before: bytes.len() as u64,
            bytes_after,
        };
        debug!(?range, ?stats, "Compacted KV log");
        Ok(stats)
    }
}

/// Decode records until the first torn or corrupt one
///
/// Returns the records and the length of the valid prefix.
fn replay(bytes: &[u8]) -> (Vec<LogRecord>, usize) {
    let mut records = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        match LogRecord::deserialize(&bytes[pos..]) {
            Ok(Some((record, consumed))) => {
                records.push(record);
                pos += consumed;
            }
            Ok(None) => break,
            Err(e) => {
                warn!(offset = pos, error = %e, "Stopping KV replay at bad record");
                break;
            }
        }
    }

    (records, pos)
}

fn apply(data: &mut BTreeMap<Vec<u8>, Vec<u8>>, operation: &Operation) {
    match operation {
        Operation::Put { key, value } => {
            data.insert(key.clone(), value.clone());
        }
        Operation::Delete { key } => {
            data.remove(key);
        }
    }
}
