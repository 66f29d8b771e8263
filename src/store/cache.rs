//! Block read cache.
//!
//! Keeps recently read 4 KiB blocks of the logical (decrypted) file so
//! repeated reads of hot chunk headers skip the syscall and the cipher.

use std::io;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};
use lru::LruCache;
use parking_lot::Mutex;

use super::handle::StoreFile;

/// Granularity of cached reads
pub(crate) const CACHE_BLOCK_SIZE: u64 = 4096;

/// LRU cache of whole logical blocks
///
/// Only complete blocks are cached; the partial block at the end of the
/// file is always read through. The owning store invalidates blocks on
/// every write and drops everything on truncate, so entries never go stale.
pub(crate) struct ReadCache {
    /// `LruCache::get` reorders entries, so lookups need the lock too
    blocks: Mutex<LruCache<u64, Bytes>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ReadCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            blocks: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Fill `buf` from `pos`, serving whole blocks from the cache
    pub fn read_exact_at(&self, file: &StoreFile, buf: &mut [u8], pos: u64) -> io::Result<()> {
        if pos.checked_add(buf.len() as u64).is_none() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("read of {} bytes at {} is out of range", buf.len(), pos),
            ));
        }

        let mut done = 0;
        while done < buf.len() {
            let logical = pos + done as u64;
            let index = logical / CACHE_BLOCK_SIZE;
            let offset = (logical % CACHE_BLOCK_SIZE) as usize;
            let n = (CACHE_BLOCK_SIZE as usize - offset).min(buf.len() - done);

            let block = self.block(file, index)?;
            if block.len() < offset + n {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "read of {} bytes at {} runs past end of file",
                        buf.len(),
                        pos
                    ),
                ));
            }
            buf[done..done + n].copy_from_slice(&block[offset..offset + n]);
            done += n;
        }
        Ok(())
    }

    /// Drop cached blocks overlapping `[pos, pos + len)`
    pub fn invalidate(&self, pos: u64, len: usize) {
        if len == 0 {
            return;
        }
        let first = pos / CACHE_BLOCK_SIZE;
        let last = pos.saturating_add(len as u64 - 1) / CACHE_BLOCK_SIZE;

        let mut blocks = self.blocks.lock();
        if last - first >= blocks.len() as u64 {
            let stale: Vec<u64> = blocks
                .iter()
                .map(|(index, _)| *index)
                .filter(|index| (first..=last).contains(index))
                .collect();
            for index in stale {
                blocks.pop(&index);
            }
        } else {
            for index in first..=last {
                blocks.pop(&index);
            }
        }
    }

    pub fn clear(&self) {
        self.blocks.lock().clear();
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn cached_blocks(&self) -> usize {
        self.blocks.lock().len()
    }

    /// Block `index` from the cache, or read from the file
    ///
    /// A short block (end of file) is returned but not cached.
    fn block(&self, file: &StoreFile, index: u64) -> io::Result<Bytes> {
        if let Some(block) = self.blocks.lock().get(&index) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(block.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let mut block = BytesMut::zeroed(CACHE_BLOCK_SIZE as usize);
        let filled = file.read_up_to(&mut block, index * CACHE_BLOCK_SIZE)?;
        block.truncate(filled);
        let block = block.freeze();

        if filled == CACHE_BLOCK_SIZE as usize {
            self.blocks.lock().put(index, block.clone());
        }
        Ok(block)
    }
}
