//! Segment and index file handling
//!
//! Naming, opening and positional reads for a table's files.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use super::Compression;

/// "headers" + Zstd → "headers.cidx"
pub fn index_file_name(table: &str, compression: Compression) -> String {
    format!("{}.{}", table, compression.index_extension())
}

/// "headers", 3, Zstd → "headers.0003.cdat"
pub fn segment_file_name(table: &str, segment: u32, compression: Compression) -> String {
    format!(
        "{}.{:04}.{}",
        table,
        segment,
        compression.segment_extension()
    )
}

/// Locates every file belonging to one table
#[derive(Debug, Clone)]
pub(crate) struct TableFiles {
    dir: PathBuf,
    name: String,
    compression: Compression,
}

impl TableFiles {
    pub(crate) fn new(dir: &Path, name: &str, compression: Compression) -> Self {
        Self {
            dir: dir.to_path_buf(),
            name: name.to_string(),
            compression,
        }
    }

    pub(crate) fn index_path(&self) -> PathBuf {
        self.dir.join(index_file_name(&self.name, self.compression))
    }

    pub(crate) fn segment_path(&self, segment: u32) -> PathBuf {
        self.dir
            .join(segment_file_name(&self.name, segment, self.compression))
    }

    /// Index path this table would have with the opposite compression
    pub(crate) fn foreign_index_path(&self) -> PathBuf {
        self.dir
            .join(index_file_name(&self.name, self.compression.other()))
    }

    /// Open the index for appending (creating it) or read-only
    pub(crate) fn open_index(&self, read_only: bool) -> io::Result<File> {
        open_appendable(&self.index_path(), read_only)
    }

    /// Open a segment as the writable head (creating it) or read-only
    pub(crate) fn open_head(&self, segment: u32, read_only: bool) -> io::Result<File> {
        open_appendable(&self.segment_path(segment), read_only)
    }

    /// Open a finalized segment for reads
    pub(crate) fn open_sealed(&self, segment: u32) -> io::Result<File> {
        File::open(self.segment_path(segment))
    }

    /// Segment numbers present on disk, ascending
    ///
    /// "bodies.0012.cdat" → 12
    pub(crate) fn list_segments(&self) -> io::Result<Vec<u32>> {
        let prefix = format!("{}.", self.name);
        let suffix = format!(".{}", self.compression.segment_extension());

        let mut segments = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();

            let number = file_name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(&suffix))
                .and_then(|number| number.parse::<u32>().ok());

            if let Some(number) = number {
                segments.push(number);
            }
        }

        segments.sort_unstable();
        Ok(segments)
    }

    /// Delete a segment file; a missing file is not an error
    pub(crate) fn remove_segment(&self, segment: u32) -> io::Result<()> {
        match fs::remove_file(self.segment_path(segment)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

fn open_appendable(path: &Path, read_only: bool) -> io::Result<File> {
    if read_only {
        File::open(path)
    } else {
        OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
    }
}

/// Fill `buf` from `file` at `offset` without moving a shared cursor
#[cfg(unix)]
pub(crate) fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

/// Fill `buf` from `file` at `offset` without moving a shared cursor
#[cfg(windows)]
pub(crate) fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
