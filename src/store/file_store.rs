//! File Store
//!
//! Blocking gateway to the physical store file.
//!
//! ## Responsibilities
//! - Open, lock, and optionally encrypt the file
//! - Positional reads and writes with size and counter bookkeeping
//! - Sync and truncate primitives
//! - Forward free-space bookkeeping to the owned bitmap

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::crypto::EncryptedFile;
use crate::error::{FileStoreError, Result};
use crate::freespace::FreeSpaceBitmap;

use super::cache::ReadCache;
use super::handle::StoreFile;
use super::lock::{FileLock, LockMode};

/// A file-backed store with block-granular free-space tracking
///
/// ## Concurrency:
/// - Mutation (`write_fully`, `truncate`, `close`, allocation) takes
///   `&mut self`, so there is exactly one writer at a time
/// - `read_fully` takes `&self` and uses positional reads, so readers can
///   share the store as long as no writer holds it
/// - `read_count` is a relaxed atomic; it is diagnostic only
/// - The read cache sits behind its own mutex; writers invalidate it while
///   holding `&mut self`, so readers never see a stale block
pub struct FileStore {
    /// Absolute path of the store file
    path: PathBuf,

    read_only: bool,

    /// Cached logical size; never below the end of the furthest write
    size: u64,

    read_count: AtomicU64,
    write_count: u64,

    /// `None` once the store is closed
    file: Option<StoreFile>,

    /// `None` when the cache is disabled
    cache: Option<ReadCache>,

    /// Held from open until close
    lock: Option<FileLock>,

    free_space: FreeSpaceBitmap,

    retention_time: Duration,
}

impl FileStore {
    /// Open a store with the default configuration
    ///
    /// An empty or missing `encryption_key` means no encryption.
    pub fn open(
        path: impl AsRef<Path>,
        read_only: bool,
        encryption_key: Option<&[u8]>,
    ) -> Result<Self> {
        Self::open_with_config(path, read_only, encryption_key, &StoreConfig::default())
    }

    /// Open a store
    ///
    /// On open:
    /// 1. Resolve the path and check that its directory exists
    /// 2. Open the file, falling back to read-only if this process may not
    ///    write to it
    /// 3. Take the advisory lock
    /// 4. Wrap the handle in the encryption pass-through if a key is given
    /// 5. Cache the logical file size
    pub fn open_with_config(
        path: impl AsRef<Path>,
        read_only: bool,
        encryption_key: Option<&[u8]>,
        config: &StoreConfig,
    ) -> Result<Self> {
        config.validate()?;
        let path = resolve_path(path.as_ref())?;

        let (file, read_only) = open_file(&path, read_only)?;

        let lock = FileLock::acquire(&file, LockMode::for_access(read_only), &path)?;

        let file = match encryption_key {
            Some(key) if !key.is_empty() => StoreFile::Encrypted(
                EncryptedFile::open(file, key, config.kdf_iterations, !read_only)
                    .map_err(|e| FileStoreError::io("open", &path, e))?,
            ),
            _ => StoreFile::Plain(file),
        };

        let size = file
            .len()
            .map_err(|e| FileStoreError::io("open", &path, e))?;

        debug!(
            path = %path.display(),
            read_only,
            encrypted = file.is_encrypted(),
            size,
            "opened file store"
        );

        Ok(Self {
            path,
            read_only,
            size,
            read_count: AtomicU64::new(0),
            write_count: 0,
            file: Some(file),
            cache: NonZeroUsize::new(config.cache_blocks).map(ReadCache::new),
            lock: Some(lock),
            free_space: FreeSpaceBitmap::with_limit(
                config.reserved_blocks,
                config.block_size,
                config.max_blocks,
            ),
            retention_time: config.retention_time,
        })
    }

    // =========================================================================
    // I/O
    // =========================================================================

    /// Read exactly `len` bytes starting at `pos`
    ///
    /// A read that runs past the end of the file fails with an `Io` error of
    /// kind `UnexpectedEof`.
    pub fn read_fully(&self, pos: u64, len: usize) -> Result<Bytes> {
        let file = self.handle()?;
        self.read_count.fetch_add(1, Ordering::Relaxed);

        let mut buf = BytesMut::zeroed(len);
        let read = match &self.cache {
            Some(cache) => cache.read_exact_at(file, &mut buf, pos),
            None => file.read_exact_at(&mut buf, pos),
        };
        read.map_err(|e| FileStoreError::io("read", &self.path, e))?;
        Ok(buf.freeze())
    }

    /// Write all of `buf` starting at `pos`
    ///
    /// Every attempt counts toward `write_count`; the cached size only grows
    /// once the write has succeeded.
    pub fn write_fully(&mut self, pos: u64, buf: &[u8]) -> Result<()> {
        self.check_writable("write")?;
        let Some(file) = self.file.as_mut() else {
            return Err(FileStoreError::Closed {
                path: self.path.clone(),
            });
        };

        self.write_count += 1;
        if let Some(cache) = &self.cache {
            cache.invalidate(pos, buf.len());
        }
        file.write_all_at(buf, pos)
            .map_err(|e| FileStoreError::io("write", &self.path, e))?;
        self.size = self.size.max(pos.saturating_add(buf.len() as u64));
        Ok(())
    }

    /// Force all written data and metadata to stable storage
    pub fn sync(&self) -> Result<()> {
        self.handle()?
            .sync_all()
            .map_err(|e| FileStoreError::io("sync", &self.path, e))
    }

    /// Resize the file to exactly `size` bytes
    ///
    /// The cached size only ever shrinks here, even when the file grows.
    pub fn truncate(&mut self, size: u64) -> Result<()> {
        self.check_writable("truncate")?;
        let Some(file) = self.file.as_mut() else {
            return Err(FileStoreError::Closed {
                path: self.path.clone(),
            });
        };

        self.write_count += 1;
        if let Some(cache) = &self.cache {
            cache.clear();
        }
        file.set_len(size)
            .map_err(|e| FileStoreError::io("truncate", &self.path, e))?;
        self.size = self.size.min(size);

        debug!(path = %self.path.display(), size, "truncated file store");
        Ok(())
    }

    /// Release the lock, close the file, and clear free-space state
    ///
    /// Teardown always completes; a failure to release the lock is still
    /// returned. Closing an already closed store is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let released = match self.lock.take() {
            Some(lock) => lock.release(),
            None => Ok(()),
        };
        let was_open = self.file.take().is_some();
        if let Some(cache) = &self.cache {
            cache.clear();
        }
        self.free_space.clear();

        if was_open {
            debug!(
                path = %self.path.display(),
                reads = self.read_count(),
                writes = self.write_count,
                "closed file store"
            );
        }

        released.map_err(|e| FileStoreError::io("close", &self.path, e))
    }

    // =========================================================================
    // Free-Space Forwarding
    // =========================================================================

    /// Mark `[pos, pos + len)` as in use
    pub fn mark_used(&mut self, pos: u64, len: u64) -> Result<()> {
        self.free_space.mark_used(pos, len)
    }

    /// Allocate blocks for `len` bytes and return their start position
    pub fn allocate(&mut self, len: u64) -> Result<u64> {
        self.free_space.allocate(len)
    }

    /// Mark `[pos, pos + len)` as free
    pub fn free(&mut self, pos: u64, len: u64) {
        self.free_space.free(pos, len);
    }

    pub fn fill_rate(&self) -> u32 {
        self.free_space.fill_rate()
    }

    pub fn first_free(&self) -> u64 {
        self.free_space.first_free()
    }

    /// Mark the whole file as empty apart from the store header
    pub fn clear(&mut self) {
        self.free_space.clear();
    }

    pub fn free_space(&self) -> &FreeSpaceBitmap {
        &self.free_space
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Cached logical size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Minimum time freed space should be kept before it is reused
    pub fn default_retention_time(&self) -> Duration {
        self.retention_time
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Number of read operations since open
    pub fn read_count(&self) -> u64 {
        self.read_count.load(Ordering::Relaxed)
    }

    /// Number of write and truncate operations since open
    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_encrypted(&self) -> bool {
        self.file.as_ref().is_some_and(StoreFile::is_encrypted)
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    /// Reads served from the block cache since open
    pub fn cache_hits(&self) -> u64 {
        self.cache.as_ref().map_or(0, ReadCache::hits)
    }

    /// Blocks read from the file to fill the cache since open
    pub fn cache_misses(&self) -> u64 {
        self.cache.as_ref().map_or(0, ReadCache::misses)
    }

    /// Whole blocks currently held by the read cache
    pub fn cached_blocks(&self) -> usize {
        self.cache.as_ref().map_or(0, ReadCache::cached_blocks)
    }

    /// Mode of the lock held on the file, if still open
    pub fn lock_mode(&self) -> Option<LockMode> {
        self.lock.as_ref().map(FileLock::mode)
    }

    /// The physical file beneath any encryption
    ///
    /// For privileged read-only use such as online backup. Never write to or
    /// truncate it while the store is open.
    pub fn raw_file(&self) -> Result<&File> {
        Ok(self.handle()?.raw())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn handle(&self) -> Result<&StoreFile> {
        self.file.as_ref().ok_or_else(|| FileStoreError::Closed {
            path: self.path.clone(),
        })
    }

    fn check_writable(&self, op: &'static str) -> Result<()> {
        if self.read_only && self.file.is_some() {
            return Err(FileStoreError::io(
                op,
                &self.path,
                io::Error::new(io::ErrorKind::PermissionDenied, "store is read-only"),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for FileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl fmt::Debug for FileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .field("read_only", &self.read_only)
            .field("size", &self.size)
            .field("encrypted", &self.is_encrypted())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Open the store file for read-write, or read-only if that was asked for
/// or this process may not write to the existing file
///
/// A file whose mode carries no write bit at all is treated as read-only
/// even for privileged processes. Returns the handle and the effective
/// read-only flag.
fn open_file(path: &Path, read_only: bool) -> Result<(File, bool)> {
    if !read_only {
        let marked_read_only = fs::metadata(path)
            .map(|metadata| metadata.permissions().readonly())
            .unwrap_or(false);

        if !marked_read_only {
            let opened = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path);
            match opened {
                Ok(file) => return Ok((file, false)),
                Err(e) if is_write_refused(&e) && path.is_file() => {}
                Err(e) => return Err(FileStoreError::io("open", path, e)),
            }
        }
        warn!(path = %path.display(), "file is not writable, opening read-only");
    }

    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|e| FileStoreError::io("open", path, e))?;
    Ok((file, true))
}

fn is_write_refused(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem
    )
}

/// Make `path` absolute and check that its parent directory exists
fn resolve_path(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(FileStoreError::Config("File name is empty".to_string()));
    }

    let path = std::path::absolute(path)
        .map_err(|e| FileStoreError::Config(format!("Invalid path {}: {}", path.display(), e)))?;

    if let Some(parent) = path.parent() {
        if !parent.is_dir() {
            return Err(FileStoreError::Config(format!(
                "Directory does not exist: {}",
                parent.display()
            )));
        }
    }

    Ok(path)
}
