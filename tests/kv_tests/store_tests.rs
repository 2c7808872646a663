//! Tests for LogStore
//!
//! These tests verify:
//! - Basic put/get/delete and persistence across reopen
//! - Torn log tails are cut in writable mode and reported read-only
//! - Whole-store and ranged compaction

use std::fs::{self, OpenOptions};
use std::io::Write;

use ancientkv::kv::{CompactionStats, LogRecord, Operation};
use ancientkv::{AncientError, KeyRange, KvConfig, KvStore, LogStore};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_store() -> (TempDir, LogStore) {
    let temp = TempDir::new().unwrap();
    let store = LogStore::open_path(temp.path()).unwrap();
    (temp, store)
}

fn read_only(temp: &TempDir) -> KvConfig {
    KvConfig::builder()
        .data_dir(temp.path())
        .read_only(true)
        .build()
}

// =============================================================================
// Basic Operation Tests
// =============================================================================

#[test]
fn test_put_get_delete() {
    let (_temp, store) = setup_temp_store();

    store.put(b"key1", b"value1").unwrap();
    store.put(b"key2", b"value2").unwrap();
    assert_eq!(store.get(b"key1").unwrap(), Some(b"value1".to_vec()));

    store.put(b"key1", b"updated").unwrap();
    assert_eq!(store.get(b"key1").unwrap(), Some(b"updated".to_vec()));

    store.delete(b"key2").unwrap();
    assert_eq!(store.get(b"key2").unwrap(), None);
    assert_eq!(store.len(), 1);

    // Deleting an absent key is fine
    store.delete(b"never").unwrap();
}

#[test]
fn test_reopen_replays_log() {
    let temp = TempDir::new().unwrap();

    {
        let store = LogStore::open_path(temp.path()).unwrap();
        store.put(b"a", b"1").unwrap();
        store.put(b"b", b"2").unwrap();
        store.delete(b"a").unwrap();
        store.sync().unwrap();
    }

    let store = LogStore::open_path(temp.path()).unwrap();
    assert_eq!(store.get(b"a").unwrap(), None);
    assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
}

#[test]
fn test_scan_returns_range_in_key_order() {
    let (_temp, store) = setup_temp_store();
    for key in [b"d", b"a", b"c", b"b"] {
        store.put(key, key).unwrap();
    }

    let range = KeyRange::new(Some(b"b".to_vec()), Some(b"d".to_vec()));
    let keys: Vec<Vec<u8>> = store.scan(&range).into_iter().map(|(k, _)| k).collect();

    assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec()]);
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_torn_tail_is_truncated() {
    let temp = TempDir::new().unwrap();
    let valid_len = {
        let store = LogStore::open_path(temp.path()).unwrap();
        store.put(b"kept", b"yes").unwrap();
        store.sync().unwrap();
        fs::metadata(store.log_path()).unwrap().len()
    };

    let torn = LogRecord::new(Operation::Put {
        key: b"lost".to_vec(),
        value: b"no".to_vec(),
    })
    .serialize()
    .unwrap();
    let log = temp.path().join("kv.log");
    let mut file = OpenOptions::new().append(true).open(&log).unwrap();
    file.write_all(&torn[..torn.len() - 2]).unwrap();
    drop(file);

    let store = LogStore::open_path(temp.path()).unwrap();

    assert_eq!(store.get(b"kept").unwrap(), Some(b"yes".to_vec()));
    assert_eq!(store.get(b"lost").unwrap(), None);
    assert_eq!(fs::metadata(&log).unwrap().len(), valid_len);

    // New writes follow the last good record
    store.put(b"after", b"1").unwrap();
    drop(store);
    let store = LogStore::open_path(temp.path()).unwrap();
    assert_eq!(store.len(), 2);
}

#[test]
fn test_read_only_reports_torn_tail() {
    let temp = TempDir::new().unwrap();
    {
        let store = LogStore::open_path(temp.path()).unwrap();
        store.put(b"k", b"v").unwrap();
    }
    let log = temp.path().join("kv.log");
    let mut file = OpenOptions::new().append(true).open(&log).unwrap();
    file.write_all(&[0xFF, 0x00, 0x00]).unwrap();
    drop(file);
    let len_before = fs::metadata(&log).unwrap().len();

    let result = LogStore::open(read_only(&temp));

    assert!(matches!(result, Err(AncientError::KvCorruption(_))));
    assert_eq!(fs::metadata(&log).unwrap().len(), len_before);
}

#[test]
fn test_read_only_store_rejects_writes() {
    let temp = TempDir::new().unwrap();
    {
        let store = LogStore::open_path(temp.path()).unwrap();
        store.put(b"k", b"v").unwrap();
    }

    let store = LogStore::open(read_only(&temp)).unwrap();

    assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
    assert!(matches!(store.put(b"x", b"y"), Err(AncientError::ReadOnly(_))));
    assert!(matches!(store.delete(b"k"), Err(AncientError::ReadOnly(_))));
    assert!(matches!(
        store.compact(&KeyRange::all()),
        Err(AncientError::ReadOnly(_))
    ));
}

// =============================================================================
// Compaction Tests
// =============================================================================

#[test]
fn test_compact_all_keeps_only_live_values() {
    let (temp, store) = setup_temp_store();
    for i in 0..10u8 {
        store.put(b"hot", &[i]).unwrap();
    }
    store.put(b"gone", b"x").unwrap();
    store.delete(b"gone").unwrap();

    let stats = store.compact(&KeyRange::all()).unwrap();

    assert_eq!(stats.records_before, 12);
    assert_eq!(stats.records_after, 1);
    assert!(stats.bytes_after < stats.bytes_before);
    assert_eq!(store.get(b"hot").unwrap(), Some(vec![9]));
    assert!(!temp.path().join("kv.log.compact").exists());

    // The compacted log is still appendable and replays the same state
    store.put(b"new", b"1").unwrap();
    drop(store);
    let store = LogStore::open_path(temp.path()).unwrap();
    assert_eq!(store.get(b"hot").unwrap(), Some(vec![9]));
    assert_eq!(store.get(b"new").unwrap(), Some(b"1".to_vec()));
    assert_eq!(store.get(b"gone").unwrap(), None);
}

#[test]
fn test_compact_range_leaves_other_records() {
    let (_temp, store) = setup_temp_store();
    store.put(b"a", b"1").unwrap();
    store.put(b"a", b"2").unwrap();
    store.put(b"b", b"1").unwrap();
    store.delete(b"b").unwrap();
    store.put(b"x", b"1").unwrap();
    store.put(b"x", b"2").unwrap();

    let range = KeyRange::new(Some(b"a".to_vec()), Some(b"c".to_vec()));
    let stats = store.compact(&range).unwrap();

    // Both "x" records survive untouched; only a=2 remains inside the range
    assert_eq!(stats.records_before, 6);
    assert_eq!(stats.records_after, 3);
    assert_eq!(store.get(b"a").unwrap(), Some(b"2".to_vec()));
    assert_eq!(store.get(b"b").unwrap(), None);
    assert_eq!(store.get(b"x").unwrap(), Some(b"2".to_vec()));
}

#[test]
fn test_compact_empty_store() {
    let (_temp, store) = setup_temp_store();

    let stats = store.compact(&KeyRange::all()).unwrap();

    assert_eq!(stats, CompactionStats::default());
    assert!(store.is_empty());
}
