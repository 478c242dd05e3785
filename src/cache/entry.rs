//! Cache Entry Module
//!
//! Defines individual cache entries and their expiry options.

use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The stored value
    pub value: String,
    /// Optional second payload stored alongside the value
    pub extra: Option<String>,
    /// Absolute expiry, None = no expiration
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry without extra or expiry.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            extra: None,
            expires_at: None,
        }
    }

    /// Creates an entry, resolving the expiry from `options` against now.
    pub fn with_options(value: String, extra: Option<String>, options: &EntryOptions) -> Self {
        Self {
            value,
            extra,
            expires_at: options.resolve(Utc::now()),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// An entry is expired once `now` reaches its expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    /// Checks if the entry has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    // == Time To Live ==
    /// Returns the remaining lifetime, or None if no expiration is set.
    ///
    /// An expired entry reports `Duration::ZERO`.
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.expires_at.map(|expires| {
            (expires - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
        })
    }
}

// == Entry Options ==
/// Expiry settings for a `set` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryOptions {
    /// Expire at this instant
    pub absolute_expiration: Option<DateTime<Utc>>,
    /// Expire this long after the write
    pub expires_after: Option<Duration>,
}

impl EntryOptions {
    /// Entry that never expires.
    pub fn none() -> Self {
        Self::default()
    }

    /// Entry that expires `ttl` after it is written.
    pub fn expires_after(ttl: Duration) -> Self {
        Self {
            expires_after: Some(ttl),
            ..Self::default()
        }
    }

    /// Entry that expires at a fixed instant.
    pub fn absolute(at: DateTime<Utc>) -> Self {
        Self {
            absolute_expiration: Some(at),
            ..Self::default()
        }
    }

    /// Resolves the expiry instant. An absolute expiration wins over a relative one.
    pub fn resolve(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if let Some(at) = self.absolute_expiration {
            return Some(at);
        }
        // Lifetimes reaching past year 9999 cannot round-trip through RFC 3339
        self.expires_after.and_then(|ttl| {
            chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|ttl| now.checked_add_signed(ttl))
                .filter(|at| at.year() <= 9999)
        })
    }
}

impl From<Option<Duration>> for EntryOptions {
    fn from(ttl: Option<Duration>) -> Self {
        Self {
            expires_after: ttl,
            ..Self::default()
        }
    }
}
