//! # AtlasFile
//!
//! The physical storage layer beneath a versioned key-value store:
//! - Block-granular free-space tracking with first-fit allocation
//! - Whole-file advisory locking (single writer, many readers)
//! - Optional transparent AES-XTS encryption of the file contents
//! - Blocking positional read/write/sync/truncate primitives
//! - Bounded LRU cache of recently read blocks
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Versioned Tree / Chunk Layer (caller)           │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │ read/write/sync/truncate     │ allocate/free
//! ┌──────────────▼──────────────────────────────▼───────────────┐
//! │                         FileStore                            │
//! └──────┬────────────────────┬─────────────────────┬───────────┘
//!        │                    │                     │
//!        ▼                    ▼                     ▼
//!  ┌───────────┐      ┌───────────────┐     ┌───────────────┐
//!  │ FileLock  │      │ EncryptedFile │     │ FreeSpace     │
//!  │ (flock)   │      │  (optional)   │     │ Bitmap        │
//!  └─────┬─────┘      └───────┬───────┘     └───────────────┘
//!        └─────────┬──────────┘
//!                  ▼
//!             ┌─────────┐
//!             │  File   │
//!             └─────────┘
//! ```

#[cfg(not(unix))]
compile_error!("atlasfile relies on Unix positional I/O and flock semantics");

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod crypto;
pub mod freespace;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::StoreConfig;
pub use error::{FileStoreError, Result};
pub use freespace::FreeSpaceBitmap;
pub use store::{FileStore, LockMode};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of AtlasFile
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
