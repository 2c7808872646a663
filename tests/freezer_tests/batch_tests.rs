//! Tests for Batch
//!
//! These tests verify:
//! - Staging order is preserved on commit
//! - Batches are single-use
//! - Read-only tables refuse staging
//! - The OnCommit sync policy

use ancientkv::{AncientError, FreezerTable, SyncPolicy, TableOptions};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_table() -> (TempDir, FreezerTable) {
    let temp = TempDir::new().unwrap();
    let table = FreezerTable::open(temp.path(), "test", TableOptions::default()).unwrap();
    (temp, table)
}

// =============================================================================
// Commit Tests
// =============================================================================

#[test]
fn test_commit_preserves_staging_order() {
    let (_temp, table) = setup_temp_table();

    let mut batch = table.new_batch();
    for i in 0..20u32 {
        batch.append_item(&i.to_be_bytes()).unwrap();
    }
    assert_eq!(batch.len(), 20);
    assert_eq!(batch.staged_bytes(), 80);

    assert_eq!(batch.commit().unwrap(), 20);
    for i in 0..20u32 {
        assert_eq!(table.retrieve(i as u64).unwrap(), i.to_be_bytes());
    }
}

#[test]
fn test_staged_items_invisible_until_commit() {
    let (_temp, table) = setup_temp_table();

    let mut batch = table.new_batch();
    batch.append_item(b"pending").unwrap();

    assert_eq!(table.len(), 0);
    assert!(matches!(table.retrieve(0), Err(AncientError::OutOfRange { .. })));

    batch.commit().unwrap();
    assert_eq!(table.retrieve(0).unwrap(), b"pending");
}

#[test]
fn test_empty_batch_commits_nothing() {
    let (_temp, table) = setup_temp_table();

    let mut batch = table.new_batch();
    assert!(batch.is_empty());

    assert_eq!(batch.commit().unwrap(), 0);
    assert!(table.is_empty());
}

#[test]
fn test_dropped_batch_writes_nothing() {
    let (_temp, table) = setup_temp_table();

    {
        let mut batch = table.new_batch();
        batch.append_item(b"abandoned").unwrap();
    }

    assert!(table.is_empty());
    assert_eq!(table.size().unwrap(), 8);
}

// =============================================================================
// Single-Use Tests
// =============================================================================

#[test]
fn test_second_commit_fails() {
    let (_temp, table) = setup_temp_table();

    let mut batch = table.new_batch();
    batch.append_item(b"once").unwrap();
    batch.commit().unwrap();

    assert!(batch.is_committed());
    assert!(matches!(batch.commit(), Err(AncientError::BatchClosed)));
    assert_eq!(table.len(), 1);
}

#[test]
fn test_append_after_commit_fails() {
    let (_temp, table) = setup_temp_table();

    let mut batch = table.new_batch();
    batch.commit().unwrap();

    assert!(matches!(
        batch.append_item(b"late"),
        Err(AncientError::BatchClosed)
    ));
}

// =============================================================================
// Read-Only / Sync Policy Tests
// =============================================================================

#[test]
fn test_read_only_table_rejects_append() {
    let temp = TempDir::new().unwrap();
    FreezerTable::open(temp.path(), "test", TableOptions::default()).unwrap();

    let options = TableOptions::default().read_only(true);
    let table = FreezerTable::open(temp.path(), "test", options).unwrap();

    let mut batch = table.new_batch();
    assert!(matches!(
        batch.append_item(b"x"),
        Err(AncientError::ReadOnly(name)) if name == "test"
    ));
}

#[test]
fn test_on_commit_policy_persists_without_explicit_sync() {
    let temp = TempDir::new().unwrap();
    let options = TableOptions::default().sync_policy(SyncPolicy::OnCommit);

    {
        let table = FreezerTable::open(temp.path(), "test", options).unwrap();
        let mut batch = table.new_batch();
        batch.append_item(b"durable").unwrap();
        batch.commit().unwrap();
        table.close();
    }

    let table = FreezerTable::open(temp.path(), "test", options).unwrap();
    assert_eq!(table.retrieve(0).unwrap(), b"durable");
    assert!(!table.open_report().was_repaired());
}
