//! Freezer Table
//!
//! One append-only column: an index file plus numbered segment files.
//!
//! ## Concurrency
//! - All mutable state sits behind one `RwLock`
//! - Commits, truncation, sync and close take the write lock
//! - Reads take the read lock and use positional reads, so a reader sees a
//!   commit either entirely or not at all

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::batch::Batch;
use super::index::{read_entries, read_entry, IndexEntry, INDEX_ENTRY_SIZE};
use super::segment::{read_exact_at, TableFiles};
use super::{Codec, Compression};
use crate::config::{SyncPolicy, TableOptions};
use crate::error::{AncientError, Result};

/// Index entries read per positional read in `retrieve_items`
const RETRIEVE_CHUNK_ENTRIES: u64 = 1024;

/// Largest end offset an index entry can record
const MAX_SEGMENT_OFFSET: u64 = u32::MAX as u64;

// =============================================================================
// Lifecycle
// =============================================================================

/// Lifecycle states of a table
///
/// ```text
/// Closed → Opening → Consistent ──────────→ Open → Closed
///                 └→ Repairing → Consistent ↗
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    Closed,
    Opening,
    Repairing,
    Consistent,
    Open,
}

impl TableState {
    fn can_advance_to(self, next: TableState) -> bool {
        use TableState::*;
        matches!(
            (self, next),
            (Closed, Opening)
                | (Opening, Consistent)
                | (Opening, Repairing)
                | (Repairing, Consistent)
                | (Consistent, Open)
                | (Open, Closed)
        )
    }
}

/// What open-time repair changed on disk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Bytes of a partial trailing index entry that were cut
    pub index_bytes_dropped: u64,

    /// Index entries dropped because their segment bytes were missing
    pub entries_dropped: u64,

    /// Unindexed bytes cut from the head segment
    pub segment_bytes_truncated: u64,

    /// Segment files past the head that were deleted
    pub segments_removed: Vec<u32>,
}

/// How a table got from `Closed` to `Open`
#[derive(Debug, Clone)]
pub struct OpenReport {
    path: Vec<TableState>,
    repair: Option<RepairReport>,
}

impl OpenReport {
    fn new() -> Self {
        Self {
            path: vec![TableState::Closed],
            repair: None,
        }
    }

    fn advance(&mut self, next: TableState) {
        let current = self.current();
        debug_assert!(
            current.can_advance_to(next),
            "invalid table transition {:?} -> {:?}",
            current,
            next
        );
        self.path.push(next);
    }

    fn current(&self) -> TableState {
        self.path.last().copied().unwrap_or(TableState::Closed)
    }

    /// Enter `Repairing` (once) and hand out the report to fill in
    fn repairing(&mut self) -> &mut RepairReport {
        if self.current() == TableState::Opening {
            self.advance(TableState::Repairing);
        }
        self.repair.get_or_insert_with(RepairReport::default)
    }

    /// States visited while opening, starting at `Closed`
    pub fn path(&self) -> &[TableState] {
        &self.path
    }

    /// Repair details, if the table was inconsistent on open
    pub fn repair(&self) -> Option<&RepairReport> {
        self.repair.as_ref()
    }

    pub fn was_repaired(&self) -> bool {
        self.repair.is_some()
    }
}

// =============================================================================
// Table
// =============================================================================

/// Open file handles of a table
struct Handles {
    index: File,
    head: File,
    /// Finalized segments below the head, opened read-only
    sealed: BTreeMap<u32, File>,
}

impl Handles {
    fn segment(&self, segment: u32, head_segment: u32) -> Option<&File> {
        if segment == head_segment {
            Some(&self.head)
        } else {
            self.sealed.get(&segment)
        }
    }
}

/// Mutable state, guarded by the table lock
struct TableInner {
    name: String,
    state: TableState,
    handles: Option<Handles>,
    /// Number of committed items
    items: u64,
    head_segment: u32,
    /// Bytes in the head segment
    head_bytes: u64,
    /// Injected write budget (bytes) before the head write path fails
    #[cfg(test)]
    fail_after: Option<u64>,
    /// Fail the next truncation
    #[cfg(test)]
    fail_truncate: bool,
}

/// An append-only column store for one named table
pub struct FreezerTable {
    name: String,
    files: TableFiles,
    options: TableOptions,
    report: OpenReport,
    inner: RwLock<TableInner>,
}

impl FreezerTable {
    /// Open or create table `name` inside `dir`
    ///
    /// On open:
    /// 1. Check the on-disk compression matches the requested one
    /// 2. Cut a partial trailing index entry
    /// 3. Drop index entries whose bytes are missing from their segment
    /// 4. Cut unindexed bytes from the head and delete segments past it
    ///
    /// Steps 2-4 are repairs; a read-only table reports them as `CorruptIndex`.
    pub fn open(dir: impl AsRef<Path>, name: &str, options: TableOptions) -> Result<Self> {
        let dir = dir.as_ref();
        let read_only = options.read_only;
        let mut report = OpenReport::new();
        report.advance(TableState::Opening);

        if !read_only {
            fs::create_dir_all(dir)?;
        }

        let files = TableFiles::new(dir, name, options.compression);
        if !files.index_path().exists() && files.foreign_index_path().exists() {
            return Err(AncientError::CompressionMismatch {
                table: name.to_string(),
                on_disk: options.compression.other().is_compressed(),
                requested: options.compression.is_compressed(),
            });
        }

        let index = files.open_index(read_only)?;
        let mut index_len = index.metadata()?.len();

        let partial = index_len % INDEX_ENTRY_SIZE;
        if partial != 0 {
            ensure_repairable(name, read_only, "index has a partial trailing entry")?;
            index_len -= partial;
            index.set_len(index_len)?;
            report.repairing().index_bytes_dropped = partial;
        }

        // Fresh table: lay down the sentinel
        if index_len == 0 {
            if read_only {
                return Err(corrupt(name, "index file is empty"));
            }
            (&index).write_all(&IndexEntry::SENTINEL.encode())?;
            index_len = INDEX_ENTRY_SIZE;
        }

        let sentinel = read_entry(&index, 0)?;
        if sentinel != IndexEntry::SENTINEL {
            return Err(corrupt(
                name,
                &format!("sentinel entry is {:?}, expected (0, 0)", sentinel),
            ));
        }

        // Walk back until the last entry's bytes exist in its segment
        let mut entries = index_len / INDEX_ENTRY_SIZE;
        let mut last = read_entry(&index, entries - 1)?;
        loop {
            let available = segment_len(&files, last.segment)?;
            if available >= last.offset as u64 {
                break;
            }
            ensure_repairable(
                name,
                read_only,
                &format!(
                    "item {} ends at offset {} but segment {} holds {} bytes",
                    entries - 2,
                    last.offset,
                    last.segment,
                    available
                ),
            )?;
            entries -= 1;
            report.repairing().entries_dropped += 1;
            last = read_entry(&index, entries - 1)?;
        }
        if entries * INDEX_ENTRY_SIZE < index_len {
            index.set_len(entries * INDEX_ENTRY_SIZE)?;
        }

        let head_segment = last.segment;
        let head = files.open_head(head_segment, read_only)?;
        let head_len = head.metadata()?.len();
        if head_len > last.offset as u64 {
            ensure_repairable(
                name,
                read_only,
                &format!(
                    "segment {} holds {} unindexed bytes",
                    head_segment,
                    head_len - last.offset as u64
                ),
            )?;
            head.set_len(last.offset as u64)?;
            report.repairing().segment_bytes_truncated = head_len - last.offset as u64;
        }

        for segment in files.list_segments()? {
            if segment > head_segment {
                ensure_repairable(
                    name,
                    read_only,
                    &format!("segment {} lies past head segment {}", segment, head_segment),
                )?;
                files.remove_segment(segment)?;
                report.repairing().segments_removed.push(segment);
            }
        }

        let mut sealed = BTreeMap::new();
        for segment in 0..head_segment {
            let file = files.open_sealed(segment).map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    corrupt(name, &format!("segment {} is missing", segment))
                } else {
                    AncientError::Io(e)
                }
            })?;
            sealed.insert(segment, file);
        }

        if let Some(repair) = report.repair() {
            index.sync_all()?;
            head.sync_all()?;
            warn!(
                table = name,
                index_bytes_dropped = repair.index_bytes_dropped,
                entries_dropped = repair.entries_dropped,
                segment_bytes_truncated = repair.segment_bytes_truncated,
                segments_removed = ?repair.segments_removed,
                "Repaired freezer table"
            );
        }
        report.advance(TableState::Consistent);
        report.advance(TableState::Open);

        let items = entries - 1;
        info!(
            table = name,
            items,
            head_segment,
            compressed = options.compression.is_compressed(),
            read_only,
            "Opened freezer table"
        );

        Ok(Self {
            name: name.to_string(),
            files,
            options,
            report,
            inner: RwLock::new(TableInner {
                name: name.to_string(),
                state: TableState::Open,
                handles: Some(Handles {
                    index,
                    head,
                    sealed,
                }),
                items,
                head_segment,
                head_bytes: last.offset as u64,
                #[cfg(test)]
                fail_after: None,
                #[cfg(test)]
                fail_truncate: false,
            }),
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read item `item`
    pub fn retrieve(&self, item: u64) -> Result<Vec<u8>> {
        let inner = self.inner.read();
        let handles = inner.handles()?;

        if item >= inner.items {
            return Err(AncientError::OutOfRange {
                item,
                length: inner.items,
            });
        }

        let bracket = read_entries(&handles.index, item, 2)?;
        let stored = inner.read_item(&bracket[0], &bracket[1])?;
        self.codec().decode(&stored)
    }

    /// Read up to `count` items starting at `start`
    ///
    /// Stops early once the stored size would exceed `max_bytes` (0 means
    /// no limit). The first item is always returned, whatever its size.
    pub fn retrieve_items(&self, start: u64, count: u64, max_bytes: u64) -> Result<Vec<Vec<u8>>> {
        let inner = self.inner.read();
        let handles = inner.handles()?;

        if start >= inner.items {
            return Err(AncientError::OutOfRange {
                item: start,
                length: inner.items,
            });
        }

        let last = start + count.min(inner.items - start);
        let mut items = Vec::new();
        let mut total = 0u64;
        let mut previous = read_entry(&handles.index, start)?;
        let mut next = start;

        'chunks: while next < last {
            let chunk = (last - next).min(RETRIEVE_CHUNK_ENTRIES);
            for entry in read_entries(&handles.index, next + 1, chunk)? {
                let (_, begin, end) = entry.bounds(&previous);
                let size = end.saturating_sub(begin);
                if !items.is_empty() && max_bytes > 0 && total + size > max_bytes {
                    break 'chunks;
                }
                total += size;

                let stored = inner.read_item(&previous, &entry)?;
                items.push(self.codec().decode(&stored)?);
                previous = entry;
            }
            next += chunk;
        }

        Ok(items)
    }

    /// Number of committed items
    pub fn len(&self) -> u64 {
        self.inner.read().items
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes on disk: index plus every segment
    pub fn size(&self) -> Result<u64> {
        let inner = self.inner.read();
        let handles = inner.handles()?;

        let mut total = handles.index.metadata()?.len() + handles.head.metadata()?.len();
        for file in handles.sealed.values() {
            total += file.metadata()?.len();
        }
        Ok(total)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Start a batch of appends
    pub fn new_batch(&self) -> Batch<'_> {
        Batch::new(self)
    }

    /// Commit encoded items; on failure the table is rolled back to its
    /// pre-batch length. Returns the new length.
    pub(crate) fn commit_items(&self, items: &[Vec<u8>]) -> Result<u64> {
        let mut inner = self.inner.write();
        inner.handles()?;
        self.ensure_writable()?;

        let checkpoint = inner.items;
        if let Err(e) = inner.write_items(&self.files, self.options.segment_capacity, items) {
            warn!(table = %self.name, checkpoint, error = %e, "Batch commit failed, rolling back");
            if let Err(rollback) = inner.truncate(&self.files, checkpoint) {
                error!(table = %self.name, error = %rollback, "Rollback after failed commit failed");
                return Err(AncientError::RollbackFailed {
                    cause: Box::new(e),
                    rollback: Box::new(rollback),
                });
            }
            return Err(e);
        }

        if self.options.sync_policy == SyncPolicy::OnCommit {
            inner.sync()?;
        }

        debug!(table = %self.name, added = items.len(), items = inner.items, "Committed batch");
        Ok(inner.items)
    }

    /// Discard every item at or past `items`; never grows the table
    pub fn truncate_to(&self, items: u64) -> Result<()> {
        let mut inner = self.inner.write();
        inner.handles()?;
        self.ensure_writable()?;

        if items >= inner.items {
            return Ok(());
        }

        let before = inner.items;
        inner.truncate(&self.files, items)?;
        inner.sync()?;

        info!(table = %self.name, from = before, to = items, "Truncated freezer table");
        Ok(())
    }

    /// fsync the head segment and the index
    pub fn sync(&self) -> Result<()> {
        let inner = self.inner.write();
        inner.sync()
    }

    /// Release every file handle; later operations fail with `Closed`
    pub fn close(&self) {
        let mut inner = self.inner.write();
        if inner.state == TableState::Open {
            inner.handles = None;
            inner.state = TableState::Closed;
            debug!(table = %self.name, "Closed freezer table");
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn compression(&self) -> Compression {
        self.options.compression
    }

    pub fn is_read_only(&self) -> bool {
        self.options.read_only
    }

    /// Current lifecycle state (`Open` or `Closed` once constructed)
    pub fn state(&self) -> TableState {
        self.inner.read().state
    }

    /// How the table was opened, including any repair performed
    pub fn open_report(&self) -> &OpenReport {
        &self.report
    }

    /// Number of the segment currently accepting appends
    pub fn head_segment(&self) -> u32 {
        self.inner.read().head_segment
    }

    pub(crate) fn codec(&self) -> &'static dyn Codec {
        self.options.compression.codec()
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.options.read_only {
            return Err(AncientError::ReadOnly(self.name.clone()));
        }
        Ok(())
    }

    /// Make the head write path fail after `bytes` more bytes
    #[cfg(test)]
    pub(crate) fn inject_write_failure(&self, bytes: u64) {
        self.inner.write().fail_after = Some(bytes);
    }

    /// Make the next truncation fail before touching any file
    #[cfg(test)]
    pub(crate) fn inject_truncate_failure(&self) {
        self.inner.write().fail_truncate = true;
    }
}

impl std::fmt::Debug for FreezerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreezerTable")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("items", &self.len())
            .finish()
    }
}

impl TableInner {
    fn handles(&self) -> Result<&Handles> {
        self.handles
            .as_ref()
            .ok_or_else(|| AncientError::Closed(self.name.clone()))
    }

    /// Stored bytes of the item bracketed by `previous` and `entry`
    fn read_item(&self, previous: &IndexEntry, entry: &IndexEntry) -> Result<Vec<u8>> {
        let table = self.name.as_str();
        let handles = self.handles()?;
        let (segment, start, end) = entry.bounds(previous);

        if end < start {
            return Err(corrupt(
                table,
                &format!("entry {:?} ends before {:?}", entry, previous),
            ));
        }

        let file = handles
            .segment(segment, self.head_segment)
            .ok_or_else(|| corrupt(table, &format!("segment {} is not open", segment)))?;

        let mut buf = vec![0u8; (end - start) as usize];
        read_exact_at(file, &mut buf, start)?;
        Ok(buf)
    }

    /// Data first, index last: a crash in between leaves only unindexed
    /// bytes, which open-time repair cuts away.
    fn write_items(&mut self, files: &TableFiles, capacity: u64, items: &[Vec<u8>]) -> Result<()> {
        let mut pending = Vec::with_capacity(items.len() * INDEX_ENTRY_SIZE as usize);

        for item in items {
            let len = item.len() as u64;
            // The head is bounded by the capacity and by what an index entry can address
            let fits = self.head_bytes + len <= capacity.min(MAX_SEGMENT_OFFSET);
            if self.head_bytes > 0 && !fits {
                self.advance_head(files)?;
            }

            let end = self.head_bytes + len;
            if end > MAX_SEGMENT_OFFSET {
                return Err(AncientError::ItemTooLarge { size: len });
            }

            self.write_head(item)?;
            self.head_bytes = end;
            pending.extend_from_slice(&IndexEntry::new(self.head_segment, end as u32).encode());
        }

        let handles = self
            .handles
            .as_ref()
            .ok_or_else(|| AncientError::Closed(self.name.clone()))?;
        (&handles.index).write_all(&pending)?;

        self.items += items.len() as u64;
        Ok(())
    }

    fn write_head(&mut self, bytes: &[u8]) -> Result<()> {
        let handles = self
            .handles
            .as_ref()
            .ok_or_else(|| AncientError::Closed(self.name.clone()))?;

        #[cfg(test)]
        if let Some(budget) = self.fail_after.as_mut() {
            if bytes.len() as u64 > *budget {
                (&handles.head).write_all(&bytes[..*budget as usize])?;
                *budget = 0;
                return Err(io::Error::new(io::ErrorKind::Other, "injected write failure").into());
            }
            *budget -= bytes.len() as u64;
        }

        (&handles.head).write_all(bytes)?;
        Ok(())
    }

    /// Seal the head and start segment `head + 1`
    fn advance_head(&mut self, files: &TableFiles) -> Result<()> {
        let handles = self
            .handles
            .as_mut()
            .ok_or_else(|| AncientError::Closed(self.name.clone()))?;

        handles.head.sync_all()?;
        let next = self.head_segment + 1;
        let new_head = files.open_head(next, false)?;
        let sealed = files.open_sealed(self.head_segment)?;

        handles.sealed.insert(self.head_segment, sealed);
        handles.head = new_head;

        debug!(table = %self.name, from = self.head_segment, to = next, "Advanced head segment");
        self.head_segment = next;
        self.head_bytes = 0;
        Ok(())
    }

    /// Cut index and data back to exactly `items` items
    fn truncate(&mut self, files: &TableFiles, items: u64) -> Result<()> {
        #[cfg(test)]
        if std::mem::take(&mut self.fail_truncate) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected truncate failure").into());
        }

        let handles = self
            .handles
            .as_mut()
            .ok_or_else(|| AncientError::Closed(self.name.clone()))?;

        let entry = read_entry(&handles.index, items)?;
        handles.index.set_len((items + 1) * INDEX_ENTRY_SIZE)?;

        if entry.segment != self.head_segment {
            handles.sealed.retain(|&segment, _| segment < entry.segment);
            handles.head = files.open_head(entry.segment, false)?;

            for segment in files.list_segments()? {
                if segment > entry.segment {
                    files.remove_segment(segment)?;
                }
            }
            debug!(table = %self.name, from = self.head_segment, to = entry.segment, "Moved head segment back");
        }
        handles.head.set_len(entry.offset as u64)?;

        self.items = items;
        self.head_segment = entry.segment;
        self.head_bytes = entry.offset as u64;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        let handles = self.handles()?;
        handles.head.sync_all()?;
        handles.index.sync_all()?;
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn corrupt(table: &str, reason: &str) -> AncientError {
    AncientError::CorruptIndex {
        table: table.to_string(),
        reason: reason.to_string(),
    }
}

fn ensure_repairable(table: &str, read_only: bool, reason: &str) -> Result<()> {
    if read_only {
        return Err(corrupt(table, reason));
    }
    warn!(table, reason, "Freezer table needs repair");
    Ok(())
}

/// Length of a segment file, 0 if it does not exist
fn segment_len(files: &TableFiles, segment: u32) -> Result<u64> {
    match fs::metadata(files.segment_path(segment)) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

// =============================================================================
// Tests
// =============================================================================
