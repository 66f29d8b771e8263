//! Tests for cross-handle locking
//!
//! These tests verify:
//! - A second writer is rejected with a lock error
//! - Readers share the file
//! - Readers and writers exclude each other
//! - Close releases the lock

use std::fs::File;
use std::path::PathBuf;

use atlasfile::store::{FileLock, LockMode};
use atlasfile::{FileStore, FileStoreError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_existing_store() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("locked.db");
    let mut store = FileStore::open(&path, false, None).unwrap();
    store.write_fully(0, b"header").unwrap();
    store.close().unwrap();
    (temp_dir, path)
}

// =============================================================================
// Store-Level Locking
// =============================================================================

#[test]
fn test_second_writer_is_locked_out() {
    let (_temp, path) = setup_existing_store();
    let _writer = FileStore::open(&path, false, None).unwrap();

    let err = FileStore::open(&path, false, None).unwrap_err();

    assert!(err.is_locked());
    assert!(matches!(err, FileStoreError::Locked { ref path } if path.ends_with("locked.db")));
}

#[test]
fn test_readers_share_the_file() {
    let (_temp, path) = setup_existing_store();

    let first = FileStore::open(&path, true, None).unwrap();
    let second = FileStore::open(&path, true, None).unwrap();

    assert_eq!(first.lock_mode(), Some(LockMode::Shared));
    assert_eq!(second.lock_mode(), Some(LockMode::Shared));
    assert_eq!(&second.read_fully(0, 6).unwrap()[..], b"header");
}

#[test]
fn test_reader_blocks_writer() {
    let (_temp, path) = setup_existing_store();
    let _reader = FileStore::open(&path, true, None).unwrap();

    let err = FileStore::open(&path, false, None).unwrap_err();

    assert!(err.is_locked());
}

#[test]
fn test_writer_blocks_reader() {
    let (_temp, path) = setup_existing_store();
    let writer = FileStore::open(&path, false, None).unwrap();
    assert_eq!(writer.lock_mode(), Some(LockMode::Exclusive));

    let err = FileStore::open(&path, true, None).unwrap_err();

    assert!(err.is_locked());
}

#[test]
fn test_close_releases_lock() {
    let (_temp, path) = setup_existing_store();
    let mut writer = FileStore::open(&path, false, None).unwrap();

    writer.close().unwrap();

    let mut again = FileStore::open(&path, false, None).unwrap();
    again.close().unwrap();
}

#[test]
fn test_drop_releases_lock() {
    let (_temp, path) = setup_existing_store();
    {
        let _writer = FileStore::open(&path, false, None).unwrap();
    }

    FileStore::open(&path, false, None).unwrap();
}

#[test]
fn test_lock_error_message_is_actionable() {
    let (_temp, path) = setup_existing_store();
    let _writer = FileStore::open(&path, false, None).unwrap();

    let err = FileStore::open(&path, false, None).unwrap_err();

    assert!(err.to_string().contains("locked"));
    assert_eq!(err.io_kind(), None);
}

// =============================================================================
// FileLock Tests
// =============================================================================

#[test]
fn test_file_lock_release_allows_relock() {
    let (_temp, path) = setup_existing_store();
    let a = File::options().read(true).write(true).open(&path).unwrap();
    let b = File::options().read(true).write(true).open(&path).unwrap();

    let lock = FileLock::acquire(&a, LockMode::Exclusive, &path).unwrap();
    assert_eq!(lock.mode(), LockMode::Exclusive);
    assert!(FileLock::acquire(&b, LockMode::Exclusive, &path).unwrap_err().is_locked());

    lock.release().unwrap();

    FileLock::acquire(&b, LockMode::Exclusive, &path).unwrap();
}

#[test]
fn test_lock_mode_for_access() {
    assert_eq!(LockMode::for_access(true), LockMode::Shared);
    assert_eq!(LockMode::for_access(false), LockMode::Exclusive);
}
