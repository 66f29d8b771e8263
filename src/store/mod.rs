//! Store Module
//!
//! The file store façade and the pieces it owns.
//!
//! ## Responsibilities
//! - Open the store file, downgrading to read-only when it is not writable
//! - Hold a whole-file advisory lock for the lifetime of the store
//! - Route I/O through the encryption pass-through when a key is given
//! - Serve repeated reads of whole blocks from a bounded LRU cache
//! - Track logical size and read/write counters
//! - Own the free-space bitmap and forward allocation calls to it
//!
//! ## Ownership
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ FileStore                                   │
//! │  ┌──────────────┐  ┌──────────┐  ┌────────┐ │
//! │  │  StoreFile   │  │ FileLock │  │ Free   │ │
//! │  │ Plain │ Enc  │  │ Ex │ Sh  │  │ Space  │ │
//! │  └──────┬───────┘  └────┬─────┘  └────────┘ │
//! └─────────┼───────────────┼───────────────────┘
//!           └─────► raw File ◄┘
//! ```

mod cache;
mod file_store;
mod handle;
mod lock;

pub use file_store::FileStore;
pub use lock::{FileLock, LockMode};
