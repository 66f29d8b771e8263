//! Tests for encrypted stores
//!
//! These tests verify:
//! - Plaintext round trips through the encryption pass-through
//! - Ciphertext on disk differs from the plaintext
//! - Logical size survives reopening
//! - Unaligned writes and truncation
//! - Out-of-range offsets are rejected without touching the file
//! - Header validation

use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use atlasfile::crypto::{CIPHER_BLOCK_SIZE, ENCRYPTION_HEADER_SIZE, MAX_LOGICAL_LEN};
use atlasfile::{FileStore, StoreConfig};
use tempfile::TempDir;

const KEY: &[u8] = b"correct horse battery staple";

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_store() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("encrypted.db");
    (temp_dir, path)
}

/// Few KDF rounds keep the tests fast
fn fast_config() -> StoreConfig {
    StoreConfig::builder().kdf_iterations(16).build()
}

fn open_encrypted(path: &Path, read_only: bool, key: &[u8]) -> FileStore {
    FileStore::open_with_config(path, read_only, Some(key), &fast_config()).unwrap()
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_new_encrypted_store_is_empty() {
    let (_temp, path) = setup_temp_store();

    let store = open_encrypted(&path, false, KEY);

    assert!(store.is_encrypted());
    assert_eq!(store.size(), 0);
    assert_eq!(fs::metadata(&path).unwrap().len(), ENCRYPTION_HEADER_SIZE);
}

#[test]
fn test_encrypted_round_trip() {
    let (_temp, path) = setup_temp_store();
    let mut store = open_encrypted(&path, false, KEY);
    let data = pattern(10_000, 3);

    store.write_fully(8192, &data).unwrap();

    assert_eq!(store.size(), 8192 + 10_000);
    assert_eq!(&store.read_fully(8192, data.len()).unwrap()[..], &data[..]);
}

#[test]
fn test_ciphertext_differs_from_plaintext() {
    let (_temp, path) = setup_temp_store();
    let mut store = open_encrypted(&path, false, KEY);
    let data = vec![0x41u8; CIPHER_BLOCK_SIZE as usize];

    store.write_fully(0, &data).unwrap();
    store.sync().unwrap();

    let mut raw = Vec::new();
    store.raw_file().unwrap().read_to_end(&mut raw).unwrap();
    let stored = &raw[ENCRYPTION_HEADER_SIZE as usize..];

    assert_eq!(stored.len(), data.len());
    assert_ne!(stored, &data[..]);
    assert!(!raw.windows(16).any(|w| w == [0x41u8; 16]));
}

#[test]
fn test_unaligned_writes_preserve_neighbours() {
    let (_temp, path) = setup_temp_store();
    let mut store = open_encrypted(&path, false, KEY);
    let base = pattern(3 * CIPHER_BLOCK_SIZE as usize, 1);
    store.write_fully(0, &base).unwrap();

    // Straddles the boundary between blocks 0 and 1
    store.write_fully(4090, b"0123456789ab").unwrap();

    let mut expected = base.clone();
    expected[4090..4102].copy_from_slice(b"0123456789ab");
    assert_eq!(&store.read_fully(0, expected.len()).unwrap()[..], &expected[..]);
}

#[test]
fn test_sparse_write_reads_zeros_in_gap() {
    let (_temp, path) = setup_temp_store();
    let mut store = open_encrypted(&path, false, KEY);

    store.write_fully(5 * CIPHER_BLOCK_SIZE + 7, b"tail").unwrap();

    let gap = store.read_fully(100, 4096).unwrap();
    assert!(gap.iter().all(|&b| b == 0));
    assert_eq!(&store.read_fully(5 * CIPHER_BLOCK_SIZE + 7, 4).unwrap()[..], b"tail");
}

#[test]
fn test_read_past_logical_end_fails() {
    let (_temp, path) = setup_temp_store();
    let mut store = open_encrypted(&path, false, KEY);
    store.write_fully(0, b"short").unwrap();

    let err = store.read_fully(0, 6).unwrap_err();

    assert_eq!(err.io_kind(), Some(ErrorKind::UnexpectedEof));
}

#[test]
fn test_repeated_read_served_from_cache() {
    let (_temp, path) = setup_temp_store();
    let mut store = open_encrypted(&path, false, KEY);
    let data = pattern(2 * CIPHER_BLOCK_SIZE as usize, 4);
    store.write_fully(0, &data).unwrap();

    store.read_fully(0, 4096).unwrap();
    let again = store.read_fully(0, 4096).unwrap();
    assert_eq!(&again[..], &data[..4096]);
    assert_eq!(store.cache_hits(), 1);

    store.write_fully(4000, b"fresh").unwrap();
    assert_eq!(&store.read_fully(4000, 5).unwrap()[..], b"fresh");
}

// =============================================================================
// Out-of-Range Tests
// =============================================================================

#[test]
fn test_write_at_far_offset_is_rejected() {
    let (_temp, path) = setup_temp_store();
    let mut store = open_encrypted(&path, false, KEY);
    let data = pattern(5000, 8);
    store.write_fully(0, &data).unwrap();
    let physical = fs::metadata(&path).unwrap().len();

    let err = store.write_fully(u64::MAX - 10, b"abcd").unwrap_err();

    assert_eq!(err.io_kind(), Some(ErrorKind::InvalidInput));
    assert_eq!(store.size(), 5000);
    assert_eq!(fs::metadata(&path).unwrap().len(), physical);
    assert_eq!(&store.read_fully(0, 5000).unwrap()[..], &data[..]);
}

#[test]
fn test_write_crossing_encrypted_limit_is_rejected() {
    let (_temp, path) = setup_temp_store();
    let mut store = open_encrypted(&path, false, KEY);

    let err = store.write_fully(MAX_LOGICAL_LEN - 2, b"abcd").unwrap_err();

    assert_eq!(err.io_kind(), Some(ErrorKind::InvalidInput));
    assert_eq!(store.size(), 0);
    assert_eq!(fs::metadata(&path).unwrap().len(), ENCRYPTION_HEADER_SIZE);
}

#[test]
fn test_read_at_far_offset_is_rejected() {
    let (_temp, path) = setup_temp_store();
    let mut store = open_encrypted(&path, false, KEY);
    store.write_fully(0, b"data").unwrap();

    let err = store.read_fully(u64::MAX - 2, 4).unwrap_err();
    assert_eq!(err.io_kind(), Some(ErrorKind::InvalidInput));

    let err = store.read_fully(MAX_LOGICAL_LEN, 4).unwrap_err();
    assert_eq!(err.io_kind(), Some(ErrorKind::UnexpectedEof));
}

#[test]
fn test_truncate_past_encrypted_limit_is_rejected() {
    let (_temp, path) = setup_temp_store();
    let data = pattern(9000, 6);
    {
        let mut store = open_encrypted(&path, false, KEY);
        store.write_fully(0, &data).unwrap();
        let physical = fs::metadata(&path).unwrap().len();

        let err = store.truncate(u64::MAX).unwrap_err();

        assert_eq!(err.io_kind(), Some(ErrorKind::InvalidInput));
        assert_eq!(store.size(), 9000);
        assert_eq!(fs::metadata(&path).unwrap().len(), physical);
        store.close().unwrap();
    }

    let store = open_encrypted(&path, true, KEY);
    assert_eq!(store.size(), 9000);
    assert_eq!(&store.read_fully(0, 9000).unwrap()[..], &data[..]);
}

// =============================================================================
// Reopen Tests
// =============================================================================

#[test]
fn test_reopen_with_same_key() {
    let (_temp, path) = setup_temp_store();
    let data = pattern(5000, 9);
    {
        let mut store = open_encrypted(&path, false, KEY);
        store.write_fully(123, &data).unwrap();
        store.sync().unwrap();
        store.close().unwrap();
    }

    let store = open_encrypted(&path, true, KEY);

    assert_eq!(store.size(), 123 + 5000);
    assert_eq!(&store.read_fully(123, 5000).unwrap()[..], &data[..]);
}

#[test]
fn test_reopen_with_wrong_key_yields_garbage() {
    let (_temp, path) = setup_temp_store();
    let data = pattern(4096, 5);
    {
        let mut store = open_encrypted(&path, false, KEY);
        store.write_fully(0, &data).unwrap();
        store.close().unwrap();
    }

    let store = open_encrypted(&path, true, b"wrong key");

    assert_ne!(&store.read_fully(0, 4096).unwrap()[..], &data[..]);
}

#[test]
fn test_read_only_open_of_empty_file_fails() {
    let (_temp, path) = setup_temp_store();
    fs::write(&path, b"").unwrap();

    let err = FileStore::open_with_config(&path, true, Some(KEY), &fast_config()).unwrap_err();

    assert_eq!(err.io_kind(), Some(ErrorKind::InvalidData));
}

#[test]
fn test_plain_file_rejected_as_encrypted() {
    let (_temp, path) = setup_temp_store();
    fs::write(&path, vec![0x11u8; 8192]).unwrap();

    let err = FileStore::open_with_config(&path, false, Some(KEY), &fast_config()).unwrap_err();

    assert_eq!(err.io_kind(), Some(ErrorKind::InvalidData));
}

#[test]
fn test_corrupted_header_detected() {
    let (_temp, path) = setup_temp_store();
    {
        let mut store = open_encrypted(&path, false, KEY);
        store.write_fully(0, b"payload").unwrap();
        store.close().unwrap();
    }

    let mut raw = fs::read(&path).unwrap();
    raw[20] ^= 0xFF; // inside the salt
    fs::write(&path, &raw).unwrap();

    let err = FileStore::open_with_config(&path, true, Some(KEY), &fast_config()).unwrap_err();
    assert_eq!(err.io_kind(), Some(ErrorKind::InvalidData));
}

#[test]
fn test_out_of_range_header_length_detected() {
    let (_temp, path) = setup_temp_store();
    {
        let mut store = open_encrypted(&path, false, KEY);
        store.write_fully(0, b"payload").unwrap();
        store.close().unwrap();
    }

    // Rewrite the length field with a huge value and a matching checksum
    let mut raw = fs::read(&path).unwrap();
    raw[28..36].copy_from_slice(&u64::MAX.to_le_bytes());
    let crc = crc32fast::hash(&raw[..36]);
    raw[36..40].copy_from_slice(&crc.to_le_bytes());
    fs::write(&path, &raw).unwrap();

    let err = FileStore::open_with_config(&path, true, Some(KEY), &fast_config()).unwrap_err();
    assert_eq!(err.io_kind(), Some(ErrorKind::InvalidData));
}

#[test]
fn test_empty_key_means_no_encryption() {
    let (_temp, path) = setup_temp_store();

    let store = FileStore::open_with_config(&path, false, Some(b""), &fast_config()).unwrap();

    assert!(!store.is_encrypted());
    assert_eq!(fs::metadata(&path).unwrap().len(), 0);
}

// =============================================================================
// Truncate Tests
// =============================================================================

#[test]
fn test_truncate_clamps_and_zeroes_tail() {
    let (_temp, path) = setup_temp_store();
    let mut store = open_encrypted(&path, false, KEY);
    store.write_fully(0, &vec![0x77u8; 10_000]).unwrap();

    store.truncate(5000).unwrap();
    assert_eq!(store.size(), 5000);
    assert_eq!(
        fs::metadata(&path).unwrap().len(),
        ENCRYPTION_HEADER_SIZE + 2 * CIPHER_BLOCK_SIZE
    );

    // Regrow past the cut: the old bytes must not reappear
    store.write_fully(9000, b"end").unwrap();
    let middle = store.read_fully(5000, 4000).unwrap();
    assert!(middle.iter().all(|&b| b == 0));
    assert!(store.read_fully(0, 5000).unwrap().iter().all(|&b| b == 0x77));
}

#[test]
fn test_truncate_persists_logical_size() {
    let (_temp, path) = setup_temp_store();
    {
        let mut store = open_encrypted(&path, false, KEY);
        store.write_fully(0, &pattern(9000, 2)).unwrap();
        store.truncate(4097).unwrap();
        store.close().unwrap();
    }

    let store = open_encrypted(&path, true, KEY);
    assert_eq!(store.size(), 4097);
}

// =============================================================================
// Locking + Encryption
// =============================================================================

#[test]
fn test_encrypted_store_is_locked() {
    let (_temp, path) = setup_temp_store();
    let _writer = open_encrypted(&path, false, KEY);

    let err = FileStore::open_with_config(&path, false, Some(KEY), &fast_config()).unwrap_err();

    assert!(err.is_locked());
}
