//! Free-Space Module
//!
//! In-memory occupancy tracking for the store file at block granularity.
//!
//! ## Responsibilities
//! - Mark byte ranges used/free, rounded outward to whole blocks
//! - First-fit allocation of runs of free blocks
//! - Fill-rate and append-position queries for the caller's compaction logic
//!
//! ## Layout
//! ```text
//! block:   0     1   │ 2     3     4     5    │ 6 ...
//!        ┌─────┬─────┼─────┬─────┬─────┬─────┼──────────────────
//!        │ hdr │ hdr │ use │ use │free │ use │ implicitly free
//!        └─────┴─────┼─────┴─────┴─────┴─────┼──────────────────
//!          reserved  │      tracked          │ watermark = 6
//! ```
//!
//! Nothing here is persisted. After an unclean shutdown the caller rebuilds
//! occupancy from its own chunk metadata with `mark_used`.

mod allocator;
mod bitset;

pub use allocator::FreeSpaceBitmap;
