//! Cache Flavors Module
//!
//! The public faces of the engine: plain strings, strings with an extra
//! payload, and typed (serde) values. All share the same engine internals;
//! `DistributedCache` picks one from the options.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::codec::DocumentLayout;
use crate::cache::engine::CacheEngine;
use crate::cache::{CacheEntry, CacheStats, EntryOptions};
use crate::config::{CacheOptions, CacheVariant};
use crate::error::{CacheError, Result};

// == Capabilities ==
/// Operations every flavor supports.
pub trait StringCache {
    fn engine(&self) -> &Arc<CacheEngine>;

    /// Value stored under `key`, or None if absent or expired.
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.engine().get_entry(key)?.map(|entry| entry.value))
    }

    /// Stores `value` under `key`, replacing any previous value, extra and expiry.
    ///
    /// A write that would push the document over its byte budget is
    /// silently discarded.
    fn set(&self, key: &str, value: &str, options: &EntryOptions) -> Result<()> {
        let entry = CacheEntry::with_options(value.to_string(), None, options);
        self.engine().set_entry(key, entry).map(|_| ())
    }

    /// Stores several values in one write; either all are kept or none.
    fn set_many(&self, items: &[(&str, &str)], options: &EntryOptions) -> Result<()> {
        let batch = items
            .iter()
            .map(|(key, value)| {
                (
                    key.to_string(),
                    CacheEntry::with_options(value.to_string(), None, options),
                )
            })
            .collect();
        self.engine().set_entries(batch).map(|_| ())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.engine().remove(key).map(|_| ())
    }

    fn clear_all(&self) -> Result<()> {
        self.engine().clear_all().map(|_| ())
    }

    /// Values of all live entries.
    fn get_all_key_values(&self) -> Result<HashMap<String, String>> {
        self.engine().get_all_values()
    }

    /// Raw text of the cache file, for diagnostics.
    fn cache_file_content(&self) -> Result<String> {
        self.engine().cache_file_content()
    }

    fn stats(&self) -> CacheStats {
        self.engine().stats()
    }

    fn get_async(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send
    where
        Self: Sized,
    {
        let engine = Arc::clone(self.engine());
        let key = key.to_string();
        async move {
            CacheEngine::run_blocking(engine, move |e| {
                Ok(e.get_entry(&key)?.map(|entry| entry.value))
            })
            .await
        }
    }

    fn set_async(
        &self,
        key: &str,
        value: &str,
        options: &EntryOptions,
    ) -> impl Future<Output = Result<()>> + Send
    where
        Self: Sized,
    {
        let engine = Arc::clone(self.engine());
        let key = key.to_string();
        let entry = CacheEntry::with_options(value.to_string(), None, options);
        async move {
            CacheEngine::run_blocking(engine, move |e| e.set_entry(&key, entry).map(|_| ())).await
        }
    }

    fn remove_async(&self, key: &str) -> impl Future<Output = Result<()>> + Send
    where
        Self: Sized,
    {
        let engine = Arc::clone(self.engine());
        let key = key.to_string();
        async move { CacheEngine::run_blocking(engine, move |e| e.remove(&key).map(|_| ())).await }
    }

    fn clear_all_async(&self) -> impl Future<Output = Result<()>> + Send
    where
        Self: Sized,
    {
        let engine = Arc::clone(self.engine());
        async move { CacheEngine::run_blocking(engine, |e| e.clear_all().map(|_| ())).await }
    }

    fn get_all_key_values_async(
        &self,
    ) -> impl Future<Output = Result<HashMap<String, String>>> + Send
    where
        Self: Sized,
    {
        let engine = Arc::clone(self.engine());
        async move { CacheEngine::run_blocking(engine, |e| e.get_all_values()).await }
    }
}

/// A value read together with its extra payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueWithExtra {
    pub value: String,
    pub extra: Option<String>,
}

/// Operations of the flavors that carry an extra payload per entry.
pub trait ExtrasCache: StringCache {
    /// Value and extra under `key`, or None if absent or expired.
    fn get_with_extra(&self, key: &str) -> Result<Option<ValueWithExtra>> {
        Ok(self.engine().get_entry(key)?.map(|entry| ValueWithExtra {
            value: entry.value,
            extra: entry.extra,
        }))
    }

    /// Stores `value` and `extra` together.
    fn set_with_extra(
        &self,
        key: &str,
        value: &str,
        extra: Option<&str>,
        options: &EntryOptions,
    ) -> Result<()> {
        let entry =
            CacheEntry::with_options(value.to_string(), extra.map(str::to_string), options);
        self.engine().set_entry(key, entry).map(|_| ())
    }
}

// == Plain Flavor ==
/// Cache of plain string values.
#[derive(Debug, Clone)]
pub struct FileStoreCache {
    engine: Arc<CacheEngine>,
}

impl FileStoreCache {
    pub fn new(options: &CacheOptions) -> Result<Self> {
        Ok(Self {
            engine: Arc::new(CacheEngine::new(options, DocumentLayout::Plain)?),
        })
    }
}

impl StringCache for FileStoreCache {
    fn engine(&self) -> &Arc<CacheEngine> {
        &self.engine
    }
}

// == Extras Flavor ==
/// Cache of string values each carrying an optional extra string.
#[derive(Debug, Clone)]
pub struct FileStoreCacheWithExtras {
    engine: Arc<CacheEngine>,
}

impl FileStoreCacheWithExtras {
    pub fn new(options: &CacheOptions) -> Result<Self> {
        Ok(Self {
            engine: Arc::new(CacheEngine::new(options, DocumentLayout::WithExtras)?),
        })
    }
}

impl StringCache for FileStoreCacheWithExtras {
    fn engine(&self) -> &Arc<CacheEngine> {
        &self.engine
    }
}

impl ExtrasCache for FileStoreCacheWithExtras {}

// == Class Flavor ==
/// Strings with extras, plus values of any serde type stored as JSON text.
#[derive(Debug, Clone)]
pub struct FileStoreCacheClass {
    engine: Arc<CacheEngine>,
}

impl FileStoreCacheClass {
    pub fn new(options: &CacheOptions) -> Result<Self> {
        Ok(Self {
            engine: Arc::new(CacheEngine::new(options, DocumentLayout::WithExtras)?),
        })
    }

    /// Deserializes the value under `key` as `T`.
    pub fn get_class<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        class_value(self.engine.get_entry(key)?)
    }

    /// Serializes `value` and stores it under `key`.
    pub fn set_class<T: Serialize>(&self, key: &str, value: &T, options: &EntryOptions) -> Result<()> {
        let entry = CacheEntry::with_options(class_json(value)?, None, options);
        self.engine.set_entry(key, entry).map(|_| ())
    }

    /// Serializes and stores several values in one write.
    pub fn set_class_many<T: Serialize>(
        &self,
        items: &[(&str, T)],
        options: &EntryOptions,
    ) -> Result<()> {
        let batch = items
            .iter()
            .map(|(key, value)| {
                Ok((
                    key.to_string(),
                    CacheEntry::with_options(class_json(value)?, None, options),
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        self.engine.set_entries(batch).map(|_| ())
    }

    pub async fn get_class_async<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let key = key.to_string();
        CacheEngine::run_blocking(Arc::clone(&self.engine), move |e| {
            class_value(e.get_entry(&key)?)
        })
        .await
    }

    pub async fn set_class_async<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        options: &EntryOptions,
    ) -> Result<()> {
        let key = key.to_string();
        let entry = CacheEntry::with_options(class_json(value)?, None, options);
        CacheEngine::run_blocking(Arc::clone(&self.engine), move |e| {
            e.set_entry(&key, entry).map(|_| ())
        })
        .await
    }
}

/// JSON text of a class value; `null` is not a storable value.
fn class_json<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_string(value)?;
    if json == "null" {
        return Err(CacheError::InvalidValue(
            "class value must not serialize to null".to_string(),
        ));
    }
    Ok(json)
}

fn class_value<T: DeserializeOwned>(entry: Option<CacheEntry>) -> Result<Option<T>> {
    match entry {
        Some(entry) => Ok(Some(serde_json::from_str(&entry.value)?)),
        None => Ok(None),
    }
}

impl StringCache for FileStoreCacheClass {
    fn engine(&self) -> &Arc<CacheEngine> {
        &self.engine
    }
}

impl ExtrasCache for FileStoreCacheClass {}

// == Variant Selector ==
/// The flavor chosen by `CacheOptions::which_variant`.
#[derive(Debug, Clone)]
pub enum DistributedCache {
    String(FileStoreCache),
    StringWithExtras(FileStoreCacheWithExtras),
    Class(FileStoreCacheClass),
}

impl DistributedCache {
    pub fn from_options(options: &CacheOptions) -> Result<Self> {
        Ok(match options.which_variant {
            CacheVariant::String => DistributedCache::String(FileStoreCache::new(options)?),
            CacheVariant::StringWithExtras => {
                DistributedCache::StringWithExtras(FileStoreCacheWithExtras::new(options)?)
            }
            CacheVariant::Class => DistributedCache::Class(FileStoreCacheClass::new(options)?),
        })
    }

    pub fn variant(&self) -> CacheVariant {
        match self {
            DistributedCache::String(_) => CacheVariant::String,
            DistributedCache::StringWithExtras(_) => CacheVariant::StringWithExtras,
            DistributedCache::Class(_) => CacheVariant::Class,
        }
    }

    pub fn as_string_cache(&self) -> &dyn StringCache {
        match self {
            DistributedCache::String(cache) => cache,
            DistributedCache::StringWithExtras(cache) => cache,
            DistributedCache::Class(cache) => cache,
        }
    }

    /// The extras capability, if this flavor has it.
    pub fn as_extras_cache(&self) -> Option<&dyn ExtrasCache> {
        match self {
            DistributedCache::String(_) => None,
            DistributedCache::StringWithExtras(cache) => Some(cache),
            DistributedCache::Class(cache) => Some(cache),
        }
    }
}
