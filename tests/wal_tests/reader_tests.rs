//! Tests for WAL Reader
//!
//! These tests verify:
//! - Reading entries from WAL file
//! - Iterator functionality
//! - Partial writes are reported, not skipped
//! - Empty file handling

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use bytes::Bytes;
use quillkv::wal::{Operation, WalEntry, WalReader};
use quillkv::QuillError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn write_entries_to_wal(path: &PathBuf, entries: &[WalEntry]) {
    let mut file = File::create(path).unwrap();
    for entry in entries {
        let bytes = entry.serialize().unwrap();
        file.write_all(&bytes).unwrap();
    }
    file.sync_all().unwrap();
}

fn pop_min_entry(lsn: u64) -> WalEntry {
    WalEntry::new(
        lsn,
        lsn,
        vec![Operation::ZPopMin {
            bucket: "scores".to_string(),
            key: Bytes::from(format!("key{}", lsn)),
        }],
    )
}

// =============================================================================
// Basic Reading Tests
// =============================================================================

#[test]
fn test_read_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let mut reader = WalReader::open(&wal_path).unwrap();

    assert!(reader.next_entry().unwrap().is_none());
    assert_eq!(reader.position(), 0);
}

#[test]
fn test_read_multiple_entries() {
    let (_temp, wal_path) = setup_temp_wal();

    let entries: Vec<_> = (1..=4).map(pop_min_entry).collect();
    write_entries_to_wal(&wal_path, &entries);

    let mut reader = WalReader::open(&wal_path).unwrap();

    for (i, original) in entries.iter().enumerate() {
        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(&entry, original, "Entry {} mismatch", i);
    }

    // Should reach EOF
    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn test_position_tracks_frames() {
    let (_temp, wal_path) = setup_temp_wal();

    let entries: Vec<_> = (1..=2).map(pop_min_entry).collect();
    write_entries_to_wal(&wal_path, &entries);
    let first_len = entries[0].serialize().unwrap().len() as u64;

    let mut reader = WalReader::open(&wal_path).unwrap();
    reader.next_entry().unwrap();

    assert_eq!(reader.position(), first_len);
}

// =============================================================================
// Iterator Tests
// =============================================================================

#[test]
fn test_iterator_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let reader = WalReader::open(&wal_path).unwrap();
    assert_eq!(reader.entries().count(), 0);
}

#[test]
fn test_iterator_multiple_entries() {
    let (_temp, wal_path) = setup_temp_wal();

    let original: Vec<_> = (1..=3).map(pop_min_entry).collect();
    write_entries_to_wal(&wal_path, &original);

    let reader = WalReader::open(&wal_path).unwrap();
    let read: Vec<_> = reader.entries().map(|r| r.unwrap()).collect();

    assert_eq!(read, original);
}

// =============================================================================
// Partial Write Tests
// =============================================================================

#[test]
fn test_partial_header_is_an_error() {
    let (_temp, wal_path) = setup_temp_wal();

    let bytes = pop_min_entry(1).serialize().unwrap();

    let mut file = File::create(&wal_path).unwrap();
    file.write_all(&bytes).unwrap();
    file.write_all(&[0u8; 8]).unwrap();
    file.sync_all().unwrap();

    let mut reader = WalReader::open(&wal_path).unwrap();

    assert!(reader.next_entry().unwrap().is_some());
    assert!(matches!(reader.next_entry(), Err(QuillError::WalCorruption(_))));
}

#[test]
fn test_partial_data_stops_iterator() {
    let (_temp, wal_path) = setup_temp_wal();

    let good = pop_min_entry(1).serialize().unwrap();
    let mut partial = pop_min_entry(2).serialize().unwrap();
    partial.truncate(20); // Header is 16 bytes

    let mut file = File::create(&wal_path).unwrap();
    file.write_all(&good).unwrap();
    file.write_all(&partial).unwrap();
    file.sync_all().unwrap();

    let results: Vec<_> = WalReader::open(&wal_path).unwrap().entries().collect();

    // One entry, then exactly one error, then the iterator is done
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(QuillError::WalCorruption(_))));
}
