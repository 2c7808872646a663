//! Tests for item codecs
//!
//! These tests verify:
//! - The decode(encode(x)) == x law for both codecs
//! - Compressed tables reject bytes that are not zstd frames
//! - A table cannot be reopened with a different compression setting

use std::fs;

use ancientkv::freezer::{Codec, Compression, RawCodec, ZstdCodec};
use ancientkv::{AncientError, FreezerTable, TableOptions};
use proptest::prelude::*;
use tempfile::TempDir;

// =============================================================================
// Round-Trip Law
// =============================================================================

proptest! {
    #[test]
    fn prop_zstd_round_trip(item in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let encoded = ZstdCodec.encode(&item).unwrap();
        prop_assert_eq!(ZstdCodec.decode(&encoded).unwrap(), item);
    }

    #[test]
    fn prop_raw_round_trip_is_identity(item in proptest::collection::vec(any::<u8>(), 0..512)) {
        let encoded = RawCodec.encode(&item).unwrap();
        prop_assert_eq!(&encoded, &item);
        prop_assert_eq!(RawCodec.decode(&encoded).unwrap(), item);
    }
}

#[test]
fn test_compression_selects_codec() {
    let item = b"header bytes header bytes header bytes".to_vec();

    let raw = Compression::None.codec().encode(&item).unwrap();
    assert_eq!(raw, item);

    let compressed = Compression::Zstd.codec().encode(&item).unwrap();
    assert_ne!(compressed, item);
    assert_eq!(Compression::Zstd.codec().decode(&compressed).unwrap(), item);
}

// =============================================================================
// Table-Level Codec Behavior
// =============================================================================

#[test]
fn test_compressed_table_round_trip() {
    let temp = TempDir::new().unwrap();
    let options = TableOptions::default().compression(Compression::Zstd);
    let table = FreezerTable::open(temp.path(), "bodies", options).unwrap();

    let items: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i; 100 + i as usize]).collect();
    let mut batch = table.new_batch();
    for item in &items {
        batch.append_item(item).unwrap();
    }
    batch.commit().unwrap();

    for (i, item) in items.iter().enumerate() {
        assert_eq!(&table.retrieve(i as u64).unwrap(), item);
    }
    assert!(temp.path().join("bodies.cidx").exists());
    assert!(temp.path().join("bodies.0000.cdat").exists());
}

#[test]
fn test_garbage_in_compressed_segment_fails_decode() {
    let temp = TempDir::new().unwrap();
    let options = TableOptions::default().compression(Compression::Zstd);

    {
        let table = FreezerTable::open(temp.path(), "receipts", options).unwrap();
        let mut batch = table.new_batch();
        batch.append_item(&[42u8; 64]).unwrap();
        batch.commit().unwrap();
        table.sync().unwrap();
        table.close();
    }

    let segment = temp.path().join("receipts.0000.cdat");
    let len = fs::metadata(&segment).unwrap().len() as usize;
    fs::write(&segment, vec![0xAB; len]).unwrap();

    let table = FreezerTable::open(temp.path(), "receipts", options).unwrap();
    let result = table.retrieve(0);
    assert!(matches!(result, Err(AncientError::DecodeFailure(_))));
}

#[test]
fn test_raw_table_reopened_compressed_fails_fast() {
    let temp = TempDir::new().unwrap();

    {
        let table = FreezerTable::open(temp.path(), "hashes", TableOptions::default()).unwrap();
        let mut batch = table.new_batch();
        batch.append_item(&[1u8; 32]).unwrap();
        batch.commit().unwrap();
        table.close();
    }

    let options = TableOptions::default().compression(Compression::Zstd);
    let result = FreezerTable::open(temp.path(), "hashes", options);

    assert!(matches!(
        result,
        Err(AncientError::CompressionMismatch {
            on_disk: false,
            requested: true,
            ..
        })
    ));
    assert!(!temp.path().join("hashes.cidx").exists());
}
