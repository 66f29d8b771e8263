//! Error types for AtlasFile
//!
//! Every fallible store operation returns one of these variants so callers
//! can match on the failure kind instead of inspecting messages.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using FileStoreError
pub type Result<T> = std::result::Result<T, FileStoreError>;

/// Unified error type for file store operations
#[derive(Debug, Error)]
pub enum FileStoreError {
    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    /// Setup mistake detected before any I/O (missing directory, bad config)
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Locking Errors
    // -------------------------------------------------------------------------
    /// Another process or handle holds a conflicting lock on the file
    #[error("The file is locked: {}", path.display())]
    Locked { path: PathBuf },

    // -------------------------------------------------------------------------
    // Free-Space Errors
    // -------------------------------------------------------------------------
    /// A block range reaches past the configured block limit
    #[error("Block range ends at block {end}, past the limit of {limit} blocks")]
    OutOfSpace { end: u64, limit: u64 },

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("Could not {op} file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        op: &'static str,
        #[source]
        source: io::Error,
    },

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("The file store is closed: {}", path.display())]
    Closed { path: PathBuf },
}

impl FileStoreError {
    /// Wrap an I/O error with the operation and path it happened on
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            op,
            source,
        }
    }

    /// True if the file is in use by another holder
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    pub fn is_out_of_space(&self) -> bool {
        matches!(self, Self::OutOfSpace { .. })
    }

    /// The underlying I/O error kind, if this is an I/O failure
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}
