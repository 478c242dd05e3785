//! File Store Cache - a distributed cache without a cache server
//!
//! Processes sharing a filesystem coordinate through one JSON file: writes
//! are serialized by a cross-process file lock and replace the file
//! atomically, reads reuse a local snapshot until the file changes.

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{
    DistributedCache, EntryOptions, ExtrasCache, FileStoreCache, FileStoreCacheClass,
    FileStoreCacheWithExtras, StringCache, ValueWithExtra,
};
pub use config::{CacheOptions, CacheVariant, LockSettings};
pub use error::{CacheError, Result};
