//! Configuration for AtlasFile
//!
//! Centralized configuration with sensible defaults.

use std::time::Duration;

use crate::error::{FileStoreError, Result};

/// Default accounting block size (4 KiB)
pub const DEFAULT_BLOCK_SIZE: u64 = 4096;

/// Default number of leading blocks reserved for the store header
pub const DEFAULT_RESERVED_BLOCKS: u64 = 2;

/// Default upper bound on tracked blocks (1 TiB of 4 KiB blocks, a 32 MiB
/// bitmap at most)
pub const DEFAULT_MAX_BLOCKS: u64 = 1 << 28;

/// Default number of 4 KiB blocks held by the read cache (4 MiB)
pub const DEFAULT_CACHE_BLOCKS: usize = 1024;

/// Default time freed space is held before the caller may reuse it
pub const DEFAULT_RETENTION_TIME: Duration = Duration::from_millis(45_000);

/// Default PBKDF2 iteration count for encrypted stores
pub const DEFAULT_KDF_ITERATIONS: u32 = 10_000;

/// Configuration for a file store instance
#[derive(Debug, Clone)]
pub struct StoreConfig {
    // -------------------------------------------------------------------------
    // Free-Space Accounting
    // -------------------------------------------------------------------------
    /// Granularity of allocation, in bytes (must be a power of two)
    pub block_size: u64,

    /// Leading blocks owned by the caller's store header, never allocatable
    pub reserved_blocks: u64,

    /// Blocks past this index are never tracked or handed out
    pub max_blocks: u64,

    // -------------------------------------------------------------------------
    // Read Cache
    // -------------------------------------------------------------------------
    /// Capacity of the block read cache; 0 disables it
    pub cache_blocks: usize,

    // -------------------------------------------------------------------------
    // Retention Policy
    // -------------------------------------------------------------------------
    /// Reported to the caller; enforcement happens in compaction
    pub retention_time: Duration,

    // -------------------------------------------------------------------------
    // Encryption
    // -------------------------------------------------------------------------
    /// PBKDF2-HMAC-SHA256 rounds used when deriving the file key
    pub kdf_iterations: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            reserved_blocks: DEFAULT_RESERVED_BLOCKS,
            max_blocks: DEFAULT_MAX_BLOCKS,
            cache_blocks: DEFAULT_CACHE_BLOCKS,
            retention_time: DEFAULT_RETENTION_TIME,
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
        }
    }
}

impl StoreConfig {
    /// Create a new config builder
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }

    /// Check the values before a store is opened with them
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 || !self.block_size.is_power_of_two() {
            return Err(FileStoreError::Config(format!(
                "Block size must be a non-zero power of two, got {}",
                self.block_size
            )));
        }
        if self.reserved_blocks >= self.max_blocks {
            return Err(FileStoreError::Config(format!(
                "Reserved blocks ({}) must be below the block limit ({})",
                self.reserved_blocks, self.max_blocks
            )));
        }
        if self.max_blocks.checked_mul(self.block_size).is_none() {
            return Err(FileStoreError::Config(format!(
                "Block limit {} at {} bytes per block overflows the file offset range",
                self.max_blocks, self.block_size
            )));
        }
        if self.kdf_iterations == 0 {
            return Err(FileStoreError::Config(
                "KDF iteration count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for StoreConfig
#[derive(Default)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    /// Set the allocation block size (in bytes)
    pub fn block_size(mut self, size: u64) -> Self {
        self.config.block_size = size;
        self
    }

    /// Set the number of reserved header blocks
    pub fn reserved_blocks(mut self, count: u64) -> Self {
        self.config.reserved_blocks = count;
        self
    }

    /// Set the highest number of blocks the allocator may track
    pub fn max_blocks(mut self, count: u64) -> Self {
        self.config.max_blocks = count;
        self
    }

    /// Set the read cache capacity in blocks (0 disables the cache)
    pub fn cache_blocks(mut self, count: usize) -> Self {
        self.config.cache_blocks = count;
        self
    }

    /// Set the reported retention time
    pub fn retention_time(mut self, retention: Duration) -> Self {
        self.config.retention_time = retention;
        self
    }

    /// Set the key derivation iteration count
    pub fn kdf_iterations(mut self, iterations: u32) -> Self {
        self.config.kdf_iterations = iterations;
        self
    }

    pub fn build(self) -> StoreConfig {
        self.config
    }
}
