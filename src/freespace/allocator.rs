//! Free-Space Bitmap
//!
//! First-fit block allocator over a growable bit vector.

use std::ops::Range;

use tracing::trace;

use crate::config::DEFAULT_MAX_BLOCKS;
use crate::error::{FileStoreError, Result};

use super::bitset::BitSet;

/// Tracks used and free regions of the store file at block granularity
///
/// Blocks `[0, first_usable)` hold the caller's store header and are
/// permanently marked used. Blocks at or past the watermark have never been
/// referenced and are implicitly free. Nothing at or past `max_blocks` is
/// ever tracked, which bounds the bitmap's memory.
#[derive(Debug, Clone)]
pub struct FreeSpaceBitmap {
    /// Accounting unit in bytes (power of two)
    block_size: u64,

    /// Index of the first block that may be allocated
    first_usable: u64,

    /// One bit per block; set means used
    set: BitSet,

    /// One past the highest block ever marked used
    watermark: u64,

    /// Exclusive upper bound on block indices
    max_blocks: u64,
}

impl FreeSpaceBitmap {
    /// Create a bitmap with `first_usable` reserved header blocks
    pub fn new(first_usable: u64, block_size: u64) -> Self {
        Self::with_limit(first_usable, block_size, DEFAULT_MAX_BLOCKS)
    }

    /// Create a bitmap that refuses ranges ending past `max_blocks`
    pub fn with_limit(first_usable: u64, block_size: u64, max_blocks: u64) -> Self {
        debug_assert!(block_size.is_power_of_two());
        debug_assert!(first_usable < max_blocks);
        let mut bitmap = Self {
            block_size,
            first_usable,
            set: BitSet::new(),
            watermark: first_usable,
            max_blocks,
        };
        bitmap.clear();
        bitmap
    }

    /// Mark `[pos, pos + len)` as in use
    ///
    /// The range is widened to whole blocks. Marking used blocks again is a
    /// no-op. A range ending past the block limit fails with `OutOfSpace`
    /// and leaves the bitmap unchanged.
    pub fn mark_used(&mut self, pos: u64, len: u64) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        let (start, end) = self.block_range(pos, len);
        self.check_limit(end)?;
        self.set.set_range(start, end);
        self.watermark = self.watermark.max(end);
        Ok(())
    }

    /// Allocate the lowest run of free blocks that fits `len` bytes
    ///
    /// Returns the byte offset of the first block. A zero-length request
    /// still reserves one block so every allocation has a distinct offset.
    /// Fails with `OutOfSpace` when no run below the block limit fits.
    pub fn allocate(&mut self, len: u64) -> Result<u64> {
        let needed = len.div_ceil(self.block_size).max(1);
        let mut candidate = self.first_usable;
        let start = loop {
            let start = self.set.next_clear(candidate);
            match self.set.next_set(start) {
                Some(used) if used - start < needed => candidate = used,
                // Either the gap is wide enough or it runs past the tracked
                // region, where every block is free.
                _ => break start,
            }
        };
        let end = start.saturating_add(needed);
        self.check_limit(end)?;
        self.set.set_range(start, end);
        self.watermark = self.watermark.max(end);

        let pos = start * self.block_size;
        trace!(len, pos, blocks = needed, "allocated");
        Ok(pos)
    }

    /// Mark `[pos, pos + len)` as free
    ///
    /// The range is widened to whole blocks; the reserved header is never
    /// released.
    pub fn free(&mut self, pos: u64, len: u64) {
        if len == 0 {
            return;
        }
        let (start, end) = self.block_range(pos, len);
        self.set.clear_range(start.max(self.first_usable), end);
    }

    /// Percentage of used blocks between the header and the watermark
    ///
    /// Returns 0 only when nothing is used; any usage reports at least 1.
    pub fn fill_rate(&self) -> u32 {
        let total = self.watermark - self.first_usable;
        let used = self.used_blocks();
        if used == 0 {
            return 0;
        }
        ((used * 100 / total) as u32).max(1)
    }

    /// Lowest byte offset past every tracked block
    pub fn first_free(&self) -> u64 {
        self.watermark * self.block_size
    }

    /// Release everything except the reserved header
    pub fn clear(&mut self) {
        self.set.reset();
        self.set.set_range(0, self.first_usable);
        self.watermark = self.first_usable;
    }

    /// Whether the block containing `pos` is in use
    pub fn is_used(&self, pos: u64) -> bool {
        self.set.get(pos / self.block_size)
    }

    /// Number of used blocks outside the reserved header
    pub fn used_blocks(&self) -> u64 {
        self.set.count_ones(self.first_usable, self.watermark)
    }

    /// Used regions outside the header as byte ranges, in ascending order
    pub fn used_ranges(&self) -> Vec<Range<u64>> {
        let mut ranges = Vec::new();
        let mut block = self.first_usable;
        while let Some(start) = self.set.next_set(block) {
            let end = self.set.next_clear(start);
            ranges.push(start * self.block_size..end * self.block_size);
            block = end;
        }
        ranges
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn reserved_blocks(&self) -> u64 {
        self.first_usable
    }

    /// One past the highest block index ever marked used
    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    pub fn max_blocks(&self) -> u64 {
        self.max_blocks
    }

    fn check_limit(&self, end: u64) -> Result<()> {
        if end > self.max_blocks {
            return Err(FileStoreError::OutOfSpace {
                end,
                limit: self.max_blocks,
            });
        }
        Ok(())
    }

    /// Blocks `[start, end)` covering the byte range, rounded outward
    fn block_range(&self, pos: u64, len: u64) -> (u64, u64) {
        let start = pos / self.block_size;
        let end = pos.saturating_add(len).div_ceil(self.block_size);
        (start, end)
    }
}
