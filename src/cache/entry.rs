//! Cache Entry Module
//!
//! Defines individual cache entries, their metadata and the per-call
//! caching options.

use std::collections::BTreeSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value
    pub value: Value,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds)
    pub expires_at: u64,
    /// Tags fixed at creation time
    pub tags: BTreeSet<String>,
    /// Write generation, strictly increasing across the store
    pub version: u64,
    /// Background renewals of this generation still running
    pub(crate) renewals: u32,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry expiring `ttl` from now.
    pub fn new(value: Value, ttl: Duration, tags: BTreeSet<String>, version: u64) -> Self {
        let now = current_timestamp_ms();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);

        Self {
            value,
            created_at: now,
            expires_at: now.saturating_add(ttl_ms),
            tags,
            version,
            renewals: 0,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time is greater than or equal to
    /// its expiration time, so a zero TTL is never readable.
    pub fn is_expired(&self) -> bool {
        current_timestamp_ms() >= self.expires_at
    }

    /// Expired and free to evict: no renewal is about to replace it.
    pub(crate) fn is_evictable(&self) -> bool {
        self.renewals == 0 && self.is_expired()
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, 0 once expired.
    pub fn ttl_remaining_ms(&self) -> u64 {
        self.expires_at.saturating_sub(current_timestamp_ms())
    }

    /// Returns remaining TTL as a `Duration`.
    pub fn ttl_remaining(&self) -> Duration {
        Duration::from_millis(self.ttl_remaining_ms())
    }

    /// Returns true if any of `tags` is attached to this entry.
    pub fn has_any_tag<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        tags.iter().any(|tag| self.tags.contains(tag.as_ref()))
    }

    /// Builds the metadata record for this entry.
    pub fn metadata(&self, key: &str) -> EntryMetadata {
        EntryMetadata {
            key: key.to_string(),
            tags: self.tags.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            version: self.version,
        }
    }
}

// == Entry Metadata ==
/// Everything known about an entry except its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryMetadata {
    pub key: String,
    pub tags: BTreeSet<String>,
    /// Unix milliseconds
    pub created_at: u64,
    /// Unix milliseconds
    pub expires_at: u64,
    pub version: u64,
}

impl EntryMetadata {
    /// Creation time as a UTC timestamp.
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        utc_from_millis(self.created_at)
    }

    /// Expiration time as a UTC timestamp, `None` when it lies beyond what
    /// a calendar date can express (e.g. a `Duration::MAX` TTL).
    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        utc_from_millis(self.expires_at)
    }

    pub fn ttl_remaining(&self) -> Duration {
        Duration::from_millis(self.expires_at.saturating_sub(current_timestamp_ms()))
    }
}

// == Cache Options ==
/// Per-call policy deciding whether a factory result is stored, and which
/// tags a stored entry carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// Store `null` results
    pub cache_null_values: bool,
    /// Store `""` results
    pub cache_empty_strings: bool,
    /// Store `[]` and `{}` results
    pub cache_empty_collections: bool,
    /// Tags attached to the stored entry
    pub tags: BTreeSet<String>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            cache_null_values: false,
            cache_empty_strings: true,
            cache_empty_collections: true,
            tags: BTreeSet::new(),
        }
    }
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn cache_null_values(mut self, enabled: bool) -> Self {
        self.cache_null_values = enabled;
        self
    }

    pub fn cache_empty_strings(mut self, enabled: bool) -> Self {
        self.cache_empty_strings = enabled;
        self
    }

    pub fn cache_empty_collections(mut self, enabled: bool) -> Self {
        self.cache_empty_collections = enabled;
        self
    }

    // == Should Store ==
    /// Applies the null/empty policy to a factory result.
    pub fn should_store(&self, value: &Value) -> bool {
        match value {
            Value::Null => self.cache_null_values,
            Value::String(s) if s.is_empty() => self.cache_empty_strings,
            Value::Array(items) if items.is_empty() => self.cache_empty_collections,
            Value::Object(fields) if fields.is_empty() => self.cache_empty_collections,
            _ => true,
        }
    }
}

// == Utility Functions ==
fn utc_from_millis(millis: u64) -> Option<DateTime<Utc>> {
    i64::try_from(millis)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
}

/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
