//! Entry Codec Module
//!
//! Converts the key/entry mapping to and from the JSON document bytes and
//! enforces the document byte budget.
//!
//! Layout of the document (two-space indented JSON object):
//!
//! ```text
//! {
//!   "plain": "value",
//!   "detailed": {
//!     "value": "value",
//!     "extra": "extra",
//!     "expires_at": "2030-01-01T00:00:00Z"
//!   }
//! }
//! ```
//!
//! Both entry forms are accepted on decode whatever the layout, so the
//! cache flavors can share one file.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};

/// Decoded document content: key to entry, in file order.
pub type Entries = IndexMap<String, CacheEntry>;

/// How entries are written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentLayout {
    /// Bare strings, objects only for entries with an expiry or extra
    Plain,
    /// Always `{value, extra, expires_at}` objects
    WithExtras,
}

#[derive(Serialize)]
#[serde(untagged)]
enum EncodedEntry<'a> {
    Plain(&'a str),
    Detailed {
        value: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        extra: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        expires_at: Option<&'a DateTime<Utc>>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DecodedEntry {
    Plain(String),
    Detailed(DetailedEntry),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DetailedEntry {
    value: String,
    #[serde(default)]
    extra: Option<String>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

impl From<DecodedEntry> for CacheEntry {
    fn from(decoded: DecodedEntry) -> Self {
        match decoded {
            DecodedEntry::Plain(value) => CacheEntry::new(value),
            DecodedEntry::Detailed(detailed) => CacheEntry {
                value: detailed.value,
                extra: detailed.extra,
                expires_at: detailed.expires_at,
            },
        }
    }
}

// == Entry Codec ==
/// Serializes the entry mapping for one cache flavor.
#[derive(Debug, Clone, Copy)]
pub struct EntryCodec {
    layout: DocumentLayout,
}

impl EntryCodec {
    pub fn new(layout: DocumentLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> DocumentLayout {
        self.layout
    }

    // == Encode ==
    /// Serializes `entries` into the document byte form.
    pub fn encode(&self, entries: &Entries) -> Result<Vec<u8>> {
        let encoded: IndexMap<&str, EncodedEntry<'_>> = entries
            .iter()
            .map(|(key, entry)| (key.as_str(), self.encode_entry(entry)))
            .collect();

        Ok(serde_json::to_vec_pretty(&encoded)?)
    }

    fn encode_entry<'a>(&self, entry: &'a CacheEntry) -> EncodedEntry<'a> {
        let bare = entry.extra.is_none() && entry.expires_at.is_none();
        if self.layout == DocumentLayout::Plain && bare {
            return EncodedEntry::Plain(&entry.value);
        }
        EncodedEntry::Detailed {
            value: &entry.value,
            extra: entry.extra.as_deref(),
            expires_at: entry.expires_at.as_ref(),
        }
    }

    // == Decode ==
    /// Parses document bytes. Empty or whitespace-only input is an empty document.
    pub fn decode(&self, bytes: &[u8]) -> Result<Entries> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Entries::new());
        }

        let decoded: IndexMap<String, DecodedEntry> = serde_json::from_slice(bytes)
            .map_err(|e| CacheError::CorruptDocument(e.to_string()))?;

        Ok(decoded
            .into_iter()
            .map(|(key, entry)| (key, entry.into()))
            .collect())
    }
}

// == Budget ==
/// Returns true when the candidate document fits in `max_bytes`.
pub fn check_budget(candidate: &[u8], max_bytes: usize) -> bool {
    candidate.len() <= max_bytes
}
