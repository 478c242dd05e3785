//! Configuration Module
//!
//! Handles loading and validating cache options from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Fixed first part of every cache file name.
pub const CACHE_FILE_PREFIX: &str = "FileStoreCacheFile";

/// Which flavor of cache the options should build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheVariant {
    /// Plain string values
    #[default]
    String,
    /// String values carrying an optional extra string
    StringWithExtras,
    /// String-with-extras plus typed (serde) values
    Class,
}

impl FromStr for CacheVariant {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "string" | "plain" => Ok(CacheVariant::String),
            "stringwithextras" | "extras" => Ok(CacheVariant::StringWithExtras),
            "class" | "typed" => Ok(CacheVariant::Class),
            other => Err(CacheError::InvalidConfig(format!(
                "unknown cache variant '{}'",
                other
            ))),
        }
    }
}

/// Retry policy for the cross-process lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSettings {
    /// First sleep after a contended attempt
    pub initial_backoff: Duration,
    /// Upper bound for a single sleep
    pub max_backoff: Duration,
    /// Total time to wait before giving up with `LockTimeout`
    pub max_wait: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(200),
            max_wait: Duration::from_secs(5),
        }
    }
}

/// Cache options.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Directory holding the shared cache file
    pub path_to_cache_file_directory: PathBuf,
    /// Distinguishes several caches living in the same directory
    pub second_part_of_cache_file_name: String,
    /// Largest document, in bytes, a write may produce
    pub max_bytes_in_json_cache_file: usize,
    /// Flavor built by `DistributedCache::from_options`
    pub which_variant: CacheVariant,
    /// Skip the check that the directory exists
    pub turn_off_static_file_path_check: bool,
    /// Lock retry policy
    pub lock: LockSettings,
}

impl CacheOptions {
    /// Creates options for the given directory, other values at their defaults.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            path_to_cache_file_directory: directory.into(),
            ..Self::default()
        }
    }

    /// Creates options by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `FILE_STORE_CACHE_DIR` - Cache file directory (default: current directory)
    /// - `FILE_STORE_CACHE_NAME` - Second part of the file name (default: Production)
    /// - `FILE_STORE_CACHE_MAX_BYTES` - Document byte budget (default: 10240000)
    /// - `FILE_STORE_CACHE_VARIANT` - string, extras or class (default: string)
    /// - `FILE_STORE_CACHE_SKIP_PATH_CHECK` - true to skip the directory check
    /// - `FILE_STORE_CACHE_LOCK_BACKOFF_MS` - First lock backoff (default: 10)
    /// - `FILE_STORE_CACHE_LOCK_TIMEOUT_MS` - Lock wait ceiling (default: 5000)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let which_variant = match env::var("FILE_STORE_CACHE_VARIANT") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.which_variant,
        };

        Ok(Self {
            path_to_cache_file_directory: env::var("FILE_STORE_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.path_to_cache_file_directory),
            second_part_of_cache_file_name: env::var("FILE_STORE_CACHE_NAME")
                .unwrap_or(defaults.second_part_of_cache_file_name),
            max_bytes_in_json_cache_file: env::var("FILE_STORE_CACHE_MAX_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_bytes_in_json_cache_file),
            which_variant,
            turn_off_static_file_path_check: env::var("FILE_STORE_CACHE_SKIP_PATH_CHECK")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.turn_off_static_file_path_check),
            lock: LockSettings {
                initial_backoff: env::var("FILE_STORE_CACHE_LOCK_BACKOFF_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.lock.initial_backoff),
                max_wait: env::var("FILE_STORE_CACHE_LOCK_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.lock.max_wait),
                ..defaults.lock
            },
        })
    }

    /// File name of the shared document.
    pub fn cache_file_name(&self) -> String {
        format!(
            "{}-{}.json",
            CACHE_FILE_PREFIX, self.second_part_of_cache_file_name
        )
    }

    /// Full path of the shared document.
    pub fn cache_file_path(&self) -> PathBuf {
        self.path_to_cache_file_directory
            .join(self.cache_file_name())
    }

    /// Checks the options before a cache is built from them.
    pub fn validate(&self) -> Result<()> {
        if self.second_part_of_cache_file_name.trim().is_empty() {
            return Err(CacheError::InvalidConfig(
                "second part of the cache file name must not be empty".to_string(),
            ));
        }
        if self.max_bytes_in_json_cache_file == 0 {
            return Err(CacheError::InvalidConfig(
                "max bytes in the cache file must be greater than zero".to_string(),
            ));
        }
        if self.lock.max_wait.is_zero() {
            return Err(CacheError::InvalidConfig(
                "lock wait ceiling must be greater than zero".to_string(),
            ));
        }
        if !self.turn_off_static_file_path_check && !self.path_to_cache_file_directory.is_dir() {
            return Err(CacheError::InvalidConfig(format!(
                "cache file directory {} does not exist",
                self.path_to_cache_file_directory.display()
            )));
        }
        Ok(())
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            path_to_cache_file_directory: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            second_part_of_cache_file_name: "Production".to_string(),
            max_bytes_in_json_cache_file: 10_000 * 1024,
            which_variant: CacheVariant::default(),
            turn_off_static_file_path_check: false,
            lock: LockSettings::default(),
        }
    }
}
