//! Encryption Module
//!
//! Transparent, length-preserving encryption of the store file.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Encryption Header (4096 bytes, plaintext)               │
//! │   Magic: "ATLASENC" (8) | Version: u32 (4)              │
//! │   Salt (16) | Logical Length: u64 (8) | CRC32 (4)       │
//! │   ... zero padding ...                                  │
//! ├─────────────────────────────────────────────────────────┤
//! │ Logical Block 0 (4096 bytes, AES-128-XTS, tweak = 0)    │
//! ├─────────────────────────────────────────────────────────┤
//! │ Logical Block 1 (4096 bytes, AES-128-XTS, tweak = 1)    │
//! │ ...                                                     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The file store only ever sees logical offsets. Key material is derived
//! once per open with PBKDF2-HMAC-SHA256 over the caller's key bytes and
//! the per-file salt.

mod file;
mod key;
mod xts;

pub use file::{EncryptedFile, CIPHER_BLOCK_SIZE, ENCRYPTION_HEADER_SIZE, MAX_LOGICAL_LEN};
pub use key::{derive_key, generate_salt, DerivedKey, KEY_LEN, SALT_LEN};
