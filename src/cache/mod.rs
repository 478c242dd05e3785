//! Cache Module
//!
//! File-backed cache shared between processes: atomic document store,
//! cross-process lock, staleness tracking, entry codec and the engine
//! composing them.

pub mod codec;
mod document;
mod engine;
mod entry;
pub mod lock;
pub mod staleness;
mod stats;
mod variants;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use codec::{check_budget, DocumentLayout, Entries, EntryCodec};
pub use document::DocumentStore;
pub use engine::{CacheEngine, WriteOutcome};
pub use entry::{CacheEntry, EntryOptions};
pub use lock::{ExclusivityGate, LockToken};
pub use staleness::{FileVersion, StalenessTracker};
pub use stats::CacheStats;
pub use variants::{
    DistributedCache, ExtrasCache, FileStoreCache, FileStoreCacheClass,
    FileStoreCacheWithExtras, StringCache, ValueWithExtra,
};
