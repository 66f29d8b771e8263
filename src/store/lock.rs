//! Advisory File Lock
//!
//! Whole-file lock that keeps a second writer away from the same store.

use std::fs::{File, TryLockError};
use std::io;
use std::path::Path;

use crate::error::{FileStoreError, Result};

/// Kind of lock taken on the store file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Single holder; taken for read-write stores
    Exclusive,

    /// Any number of holders; taken for read-only stores
    Shared,
}

impl LockMode {
    pub fn for_access(read_only: bool) -> Self {
        if read_only {
            LockMode::Shared
        } else {
            LockMode::Exclusive
        }
    }
}

/// A held lock on the store file
///
/// Holds its own duplicate of the file descriptor; the lock belongs to the
/// open file description, so it is released by `release` or when every
/// descriptor for it is closed.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    mode: LockMode,
}

impl FileLock {
    /// Try to lock `file` without blocking
    ///
    /// Fails with `Locked` if any other holder has a conflicting lock, even
    /// one inside this process.
    pub fn acquire(file: &File, mode: LockMode, path: &Path) -> Result<Self> {
        let file = file
            .try_clone()
            .map_err(|e| FileStoreError::io("lock", path, e))?;

        let attempt = match mode {
            LockMode::Exclusive => file.try_lock(),
            LockMode::Shared => file.try_lock_shared(),
        };

        match attempt {
            Ok(()) => Ok(Self { file, mode }),
            Err(TryLockError::WouldBlock) => Err(FileStoreError::Locked {
                path: path.to_path_buf(),
            }),
            Err(TryLockError::Error(e)) => Err(FileStoreError::io("lock", path, e)),
        }
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Release the lock explicitly so failures can be reported
    pub fn release(self) -> io::Result<()> {
        self.file.unlock()
    }
}
