//! Cache Engine Module
//!
//! Read/modify/write cycle over the shared document. Writes run under the
//! cross-process gate; reads reuse the local snapshot until the staleness
//! tracker reports that the file changed.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cache::codec::{check_budget, DocumentLayout, Entries, EntryCodec};
use crate::cache::document::DocumentStore;
use crate::cache::lock::ExclusivityGate;
use crate::cache::staleness::{FileVersion, StalenessTracker};
use crate::cache::{CacheEntry, CacheStats};
use crate::config::CacheOptions;
use crate::error::{CacheError, Result};

/// Result of a mutating call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The new document was written
    Persisted,
    /// Nothing changed, so nothing was written
    Unchanged,
    /// The new document would exceed the byte budget and was discarded
    DroppedOverBudget,
}

/// Snapshot plus the marker it was decoded at; always updated together.
#[derive(Debug)]
struct LocalView {
    tracker: StalenessTracker,
    entries: Arc<Entries>,
}

// == Cache Engine ==
#[derive(Debug)]
pub struct CacheEngine {
    store: DocumentStore,
    gate: ExclusivityGate,
    codec: EntryCodec,
    max_bytes: usize,
    view: RwLock<LocalView>,
    stats: Mutex<CacheStats>,
}

impl CacheEngine {
    // == Constructor ==
    /// Builds an engine for the file named by `options`. Nothing is read yet.
    pub fn new(options: &CacheOptions, layout: DocumentLayout) -> Result<Self> {
        options.validate()?;

        let path = options.cache_file_path();
        info!(
            path = %path.display(),
            max_bytes = options.max_bytes_in_json_cache_file,
            ?layout,
            "File store cache initialized"
        );

        Ok(Self {
            gate: ExclusivityGate::for_document(&path, options.lock.clone()),
            view: RwLock::new(LocalView {
                tracker: StalenessTracker::new(&path),
                entries: Arc::new(Entries::new()),
            }),
            store: DocumentStore::new(path),
            codec: EntryCodec::new(layout),
            max_bytes: options.max_bytes_in_json_cache_file,
            stats: Mutex::new(CacheStats::new()),
        })
    }

    pub fn file_path(&self) -> &Path {
        self.store.path()
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    // == Read Path ==
    /// Current decoded document, reloaded first if the file changed.
    pub fn snapshot(&self) -> Result<Arc<Entries>> {
        {
            let view = self.view.read();
            if !view.tracker.is_stale()? {
                return Ok(Arc::clone(&view.entries));
            }
        }
        self.reload()
    }

    fn reload(&self) -> Result<Arc<Entries>> {
        // Marker first: a write landing before the read makes the next check stale
        let version = self.store.version()?;
        let bytes = self.store.load()?;
        let entries = self.decode(&bytes)?;

        debug!(path = %self.store.path().display(), entries = entries.len(), "Reloaded cache file");
        self.stats.lock().record_reload();
        Ok(self.install(version, entries))
    }

    fn install(&self, version: FileVersion, entries: Entries) -> Arc<Entries> {
        let entries = Arc::new(entries);
        let mut view = self.view.write();
        view.entries = Arc::clone(&entries);
        view.tracker.record_fresh(version);
        entries
    }

    fn decode(&self, bytes: &[u8]) -> Result<Entries> {
        self.codec.decode(bytes).map_err(|e| match e {
            CacheError::CorruptDocument(reason) => CacheError::CorruptDocument(format!(
                "{}: {}",
                self.store.path().display(),
                reason
            )),
            other => other,
        })
    }

    // == Get ==
    /// Returns the live entry for `key`; expired entries read as absent.
    pub fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let snapshot = self.snapshot()?;
        let found = snapshot
            .get(key)
            .filter(|entry| !entry.is_expired())
            .cloned();

        let mut stats = self.stats.lock();
        if found.is_some() {
            stats.record_hit();
        } else {
            stats.record_miss();
        }
        Ok(found)
    }

    // == Get All ==
    /// Values of every live entry. Extras are not included.
    pub fn get_all_values(&self) -> Result<HashMap<String, String>> {
        let snapshot = self.snapshot()?;
        let now = Utc::now();
        Ok(snapshot
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect())
    }

    /// Raw text of the document, empty if the file does not exist.
    pub fn cache_file_content(&self) -> Result<String> {
        let bytes = self.store.load()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    // == Set ==
    /// Upserts one entry.
    pub fn set_entry(&self, key: &str, entry: CacheEntry) -> Result<WriteOutcome> {
        validate_key(key)?;
        let key = key.to_string();
        self.mutate(move |entries| {
            entries.insert(key, entry);
            true
        })
    }

    /// Upserts several entries in one cycle; the budget applies to the batch as a whole.
    pub fn set_entries(&self, batch: Vec<(String, CacheEntry)>) -> Result<WriteOutcome> {
        for (key, _) in &batch {
            validate_key(key)?;
        }
        self.mutate(move |entries| {
            let changed = !batch.is_empty();
            entries.extend(batch);
            changed
        })
    }

    // == Remove ==
    /// Deletes `key`; an absent key is a no-op.
    pub fn remove(&self, key: &str) -> Result<WriteOutcome> {
        self.mutate(|entries| entries.shift_remove(key).is_some())
    }

    // == Clear All ==
    /// Replaces the document with an empty one.
    ///
    /// The current content is never decoded, so this also resets a corrupt file.
    pub fn clear_all(&self) -> Result<WriteOutcome> {
        let mut token = self.gate.acquire()?;
        if token.was_contended() {
            self.stats.lock().record_lock_contention();
        }

        let outcome = self.write_locked(Entries::new());
        let released = self.gate.release(&mut token);
        let outcome = outcome?;
        released?;
        Ok(outcome)
    }

    // == Mutation Pipeline ==
    /// Lock, load, apply `mutation`, drop expired entries, budget check,
    /// persist, release. `mutation` returns whether it changed anything.
    fn mutate<F>(&self, mutation: F) -> Result<WriteOutcome>
    where
        F: FnOnce(&mut Entries) -> bool,
    {
        let mut token = self.gate.acquire()?;
        if token.was_contended() {
            self.stats.lock().record_lock_contention();
        }

        let outcome = self.mutate_locked(mutation);
        let released = self.gate.release(&mut token);
        let outcome = outcome?;
        released?;
        Ok(outcome)
    }

    fn mutate_locked<F>(&self, mutation: F) -> Result<WriteOutcome>
    where
        F: FnOnce(&mut Entries) -> bool,
    {
        let version = self.store.version()?;
        let bytes = self.store.load()?;
        let current = self.decode(&bytes)?;

        let mut updated = current.clone();
        let mut changed = mutation(&mut updated);

        let now = Utc::now();
        let before = updated.len();
        updated.retain(|_, entry| !entry.is_expired_at(now));
        let purged = before - updated.len();
        if purged > 0 {
            debug!(purged, "Dropping expired entries while rewriting cache file");
            changed = true;
        }

        if !changed {
            self.install(version, current);
            return Ok(WriteOutcome::Unchanged);
        }

        let candidate = self.codec.encode(&updated)?;
        if !check_budget(&candidate, self.max_bytes) {
            // Over-budget writes are discarded without an error: the cache is
            // best-effort and callers observe the value as missing.
            warn!(
                path = %self.store.path().display(),
                size = candidate.len(),
                max_bytes = self.max_bytes,
                "Cache write dropped: document would exceed its byte budget"
            );
            self.stats.lock().record_dropped_write();
            self.install(version, current);
            return Ok(WriteOutcome::DroppedOverBudget);
        }

        self.persist(&candidate, updated)
    }

    fn write_locked(&self, entries: Entries) -> Result<WriteOutcome> {
        let candidate = self.codec.encode(&entries)?;
        self.persist(&candidate, entries)
    }

    fn persist(&self, candidate: &[u8], entries: Entries) -> Result<WriteOutcome> {
        self.store.save(candidate)?;
        // Still under the gate, so this marker belongs to our own write
        let version = self.store.version()?;
        self.install(version, entries);
        self.stats.lock().record_write();
        Ok(WriteOutcome::Persisted)
    }

    // == Async ==
    /// Runs a blocking engine call on tokio's blocking pool.
    pub async fn run_blocking<R, F>(engine: Arc<Self>, call: F) -> Result<R>
    where
        F: FnOnce(&CacheEngine) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        tokio::task::spawn_blocking(move || call(&engine))
            .await
            .map_err(|e| CacheError::Internal(format!("blocking cache task failed: {}", e)))?
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidValue(
            "cache key must not be empty".to_string(),
        ));
    }
    Ok(())
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EntryOptions;
    use std::fs;
    use std::thread::sleep;
    use std::time::Duration;
    use tempfile::TempDir;

    fn engine_in(dir: &TempDir, max_bytes: usize, layout: DocumentLayout) -> CacheEngine {
        let mut options = CacheOptions::new(dir.path());
        options.second_part_of_cache_file_name = "EngineTests".to_string();
        options.max_bytes_in_json_cache_file = max_bytes;
        CacheEngine::new(&options, layout).unwrap()
    }

    #[test]
    fn test_missing_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir, 10_000, DocumentLayout::Plain);

        assert!(engine.get_entry("anything").unwrap().is_none());
        assert!(engine.get_all_values().unwrap().is_empty());
        assert_eq!(engine.cache_file_content().unwrap(), "");
        assert!(!engine.file_path().exists());
    }

    #[test]
    fn test_set_persists_and_reads_back() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir, 10_000, DocumentLayout::Plain);

        let outcome = engine.set_entry("key1", CacheEntry::new("value1")).unwrap();
        assert_eq!(outcome, WriteOutcome::Persisted);

        assert_eq!(engine.get_entry("key1").unwrap().unwrap().value, "value1");
        assert_eq!(
            engine.cache_file_content().unwrap(),
            "{\n  \"key1\": \"value1\"\n}"
        );
    }

    #[test]
    fn test_own_write_needs_no_reload() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir, 10_000, DocumentLayout::Plain);

        engine.set_entry("key1", CacheEntry::new("value1")).unwrap();
        engine.get_entry("key1").unwrap();
        engine.get_entry("key1").unwrap();

        assert_eq!(engine.stats().reloads, 0);
        assert_eq!(engine.stats().writes, 1);
        assert_eq!(engine.stats().hits, 2);
    }

    #[test]
    fn test_external_change_triggers_reload() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir, 10_000, DocumentLayout::Plain);
        engine.set_entry("key1", CacheEntry::new("value1")).unwrap();

        let other = DocumentStore::new(engine.file_path());
        other.save(b"{\"key1\": \"changed elsewhere\"}").unwrap();

        assert_eq!(
            engine.get_entry("key1").unwrap().unwrap().value,
            "changed elsewhere"
        );
        assert_eq!(engine.stats().reloads, 1);
    }

    #[test]
    fn test_empty_key_rejected_before_io() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir, 10_000, DocumentLayout::Plain);

        let result = engine.set_entry("", CacheEntry::new("value"));
        assert!(matches!(result, Err(CacheError::InvalidValue(_))));
        assert!(!engine.file_path().exists());
    }

    #[test]
    fn test_budget_overflow_is_dropped() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir, 100, DocumentLayout::WithExtras);
        let value = "123456789012345678901234567890";

        assert_eq!(
            engine.set_entry("Test1", CacheEntry::new(value)).unwrap(),
            WriteOutcome::Persisted
        );
        let before = engine.cache_file_content().unwrap();

        assert_eq!(
            engine.set_entry("Test2", CacheEntry::new(value)).unwrap(),
            WriteOutcome::DroppedOverBudget
        );
        assert_eq!(engine.cache_file_content().unwrap(), before);
        assert_eq!(engine.get_all_values().unwrap().len(), 1);
        assert!(engine.get_entry("Test2").unwrap().is_none());
        assert_eq!(engine.stats().dropped_writes, 1);
    }

    #[test]
    fn test_remove_absent_key_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir, 10_000, DocumentLayout::Plain);
        engine.set_entry("key1", CacheEntry::new("value1")).unwrap();

        assert_eq!(engine.remove("missing").unwrap(), WriteOutcome::Unchanged);
        assert_eq!(engine.stats().writes, 1);
        assert_eq!(engine.get_all_values().unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_document_is_reported() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir, 10_000, DocumentLayout::Plain);
        fs::write(engine.file_path(), "{ this is not json").unwrap();

        assert!(matches!(
            engine.get_entry("key"),
            Err(CacheError::CorruptDocument(_))
        ));
        assert!(matches!(
            engine.set_entry("key", CacheEntry::new("value")),
            Err(CacheError::CorruptDocument(_))
        ));
        // Not repaired behind the caller's back
        assert_eq!(engine.cache_file_content().unwrap(), "{ this is not json");
    }

    #[test]
    fn test_clear_all_resets_corrupt_document() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir, 10_000, DocumentLayout::Plain);
        fs::write(engine.file_path(), "garbage").unwrap();

        engine.clear_all().unwrap();

        assert!(engine.get_all_values().unwrap().is_empty());
        assert_eq!(engine.cache_file_content().unwrap(), "{}");
    }

    #[test]
    fn test_expired_entries_hidden_then_compacted() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir, 10_000, DocumentLayout::Plain);

        let short = CacheEntry::with_options(
            "short".to_string(),
            None,
            &EntryOptions::expires_after(Duration::from_millis(100)),
        );
        engine.set_entry("short", short).unwrap();
        engine.set_entry("long", CacheEntry::new("long")).unwrap();

        sleep(Duration::from_millis(200));

        // Hidden from reads but still in the file
        assert!(engine.get_entry("short").unwrap().is_none());
        assert_eq!(engine.get_all_values().unwrap().len(), 1);
        assert!(engine.cache_file_content().unwrap().contains("short"));

        // The next rewrite drops it
        engine.set_entry("other", CacheEntry::new("x")).unwrap();
        assert!(!engine.cache_file_content().unwrap().contains("short"));
    }

    #[test]
    fn test_set_entries_is_all_or_nothing() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir, 60, DocumentLayout::Plain);

        let batch = vec![
            ("a".to_string(), CacheEntry::new("1111111111")),
            ("b".to_string(), CacheEntry::new("2222222222")),
            ("c".to_string(), CacheEntry::new("3333333333")),
        ];
        assert_eq!(
            engine.set_entries(batch).unwrap(),
            WriteOutcome::DroppedOverBudget
        );
        assert!(engine.get_all_values().unwrap().is_empty());

        let batch = vec![
            ("a".to_string(), CacheEntry::new("1")),
            ("b".to_string(), CacheEntry::new("2")),
        ];
        assert_eq!(engine.set_entries(batch).unwrap(), WriteOutcome::Persisted);
        assert_eq!(engine.get_all_values().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_run_blocking() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(engine_in(&dir, 10_000, DocumentLayout::Plain));

        CacheEngine::run_blocking(Arc::clone(&engine), |e| {
            e.set_entry("async", CacheEntry::new("value"))
        })
        .await
        .unwrap();

        let value = CacheEngine::run_blocking(engine, |e| e.get_entry("async"))
            .await
            .unwrap();
        assert_eq!(value.unwrap().value, "value");
    }
}
