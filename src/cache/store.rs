//! Cache Store Module
//!
//! Concurrent key -> entry table with TTL expiration, kept in step with the
//! `MetadataIndex`.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;

use crate::cache::{CacheEntry, MetadataIndex};

// == Cache Store ==
/// Sharded cache storage with lazy TTL expiry.
///
/// Every mutation of a key updates the index while the key's shard lock is
/// held, so a reader never sees an entry without its metadata or the reverse.
///
/// An expired entry with a renewal in progress reads as absent but is not
/// evicted, so the renewal can still replace it. Explicit removal and
/// invalidation drop it regardless.
#[derive(Debug)]
pub struct CacheStore {
    /// Key-value storage
    entries: DashMap<String, CacheEntry>,
    /// Tags and timestamps for invalidation scans
    index: MetadataIndex,
    /// Source of entry versions
    next_version: AtomicU64,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore {
    // == Constructor ==
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            index: MetadataIndex::new(),
            next_version: AtomicU64::new(1),
        }
    }

    fn version(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::Relaxed)
    }

    // == Set ==
    /// Stores a value, replacing any previous entry and its tags.
    ///
    /// Returns the new entry's version.
    pub fn set(&self, key: &str, value: Value, ttl: Duration, tags: BTreeSet<String>) -> u64 {
        let entry = CacheEntry::new(value, ttl, tags, self.version());
        let version = entry.version;

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                self.index.record(entry.metadata(key));
                occupied.insert(entry);
            }
            Entry::Vacant(vacant) => {
                self.index.record(entry.metadata(key));
                vacant.insert(entry);
            }
        }

        version
    }

    // == Set If Version ==
    /// Replaces the entry only if it is still the generation `expected`.
    ///
    /// Returns the new version, or `None` when the key was rewritten,
    /// removed or swept since `expected` was observed.
    pub fn set_if_version(
        &self,
        key: &str,
        expected: u64,
        value: Value,
        ttl: Duration,
        tags: BTreeSet<String>,
    ) -> Option<u64> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if occupied.get().version == expected => {
                let entry = CacheEntry::new(value, ttl, tags, self.version());
                let version = entry.version;
                self.index.record(entry.metadata(key));
                occupied.insert(entry);
                Some(version)
            }
            _ => None,
        }
    }

    // == Renewal ==
    /// Marks generation `version` of `key` as being renewed.
    ///
    /// Returns `None` when the key no longer holds that generation. Until
    /// the returned guard drops, the entry survives expiry so that
    /// `set_if_version` can still land on it.
    pub fn begin_renewal(self: &Arc<Self>, key: &str, version: u64) -> Option<Renewal> {
        let mut entry = self.entries.get_mut(key)?;
        if entry.version != version {
            return None;
        }
        entry.renewals += 1;

        Some(Renewal {
            store: Arc::clone(self),
            key: key.to_string(),
            version,
        })
    }

    fn end_renewal(&self, key: &str, version: u64) {
        if let Entry::Occupied(mut occupied) = self.entries.entry(key.to_string()) {
            if occupied.get().version != version {
                return;
            }
            let entry = occupied.get_mut();
            entry.renewals = entry.renewals.saturating_sub(1);
            if entry.is_evictable() {
                self.index.remove(key);
                occupied.remove();
            }
        }
    }

    // == Get ==
    /// Returns a live entry.
    ///
    /// An expired entry is treated as absent and removed on the way out,
    /// unless it is being renewed.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired() {
                return Some(entry.clone());
            }
        }

        self.remove_expired(key);
        None
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false)
    }

    // == Remove ==
    /// Removes a key. Returns true only if a live entry was removed.
    pub fn remove(&self, key: &str) -> bool {
        self.remove_if(key, |_| true)
    }

    /// Removes a key if `predicate` holds for its live entry.
    ///
    /// The predicate runs under the key's lock. An expired entry is dropped
    /// regardless and reported as not removed.
    pub fn remove_if<P>(&self, key: &str, predicate: P) -> bool
    where
        P: FnOnce(&CacheEntry) -> bool,
    {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(occupied) => {
                let expired = occupied.get().is_expired();
                if expired || predicate(occupied.get()) {
                    self.index.remove(key);
                    occupied.remove();
                    !expired
                } else {
                    false
                }
            }
            Entry::Vacant(_) => false,
        }
    }

    fn remove_expired(&self, key: &str) -> bool {
        if let Entry::Occupied(occupied) = self.entries.entry(key.to_string()) {
            if occupied.get().is_evictable() {
                self.index.remove(key);
                occupied.remove();
                return true;
            }
        }
        false
    }

    // == Keys ==
    /// Live keys, optionally restricted to those starting with `prefix`.
    pub fn keys(&self, prefix: Option<&str>) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired())
            .filter(|entry| prefix.map_or(true, |p| entry.key().starts_with(p)))
            .map(|entry| entry.key().clone())
            .collect()
    }

    // == Purge Expired ==
    /// Removes all expired entries not being renewed from the store and
    /// index.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&self) -> usize {
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_evictable())
            .map(|entry| entry.key().clone())
            .collect();

        expired_keys
            .iter()
            .filter(|key| self.remove_expired(key))
            .count()
    }

    pub fn index(&self) -> &MetadataIndex {
        &self.index
    }

    // == Length ==
    /// Number of physically present entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// == Renewal Guard ==
/// Keeps one entry generation from being evicted on expiry while a
/// background renewal computes its replacement.
#[derive(Debug)]
pub struct Renewal {
    store: Arc<CacheStore>,
    key: String,
    version: u64,
}

impl Renewal {
    /// Replaces the renewed generation. `None` when the key was rewritten
    /// or removed since the renewal began.
    pub fn complete(&self, value: Value, ttl: Duration, tags: BTreeSet<String>) -> Option<u64> {
        self.store
            .set_if_version(&self.key, self.version, value, ttl, tags)
    }
}

impl Drop for Renewal {
    fn drop(&mut self) {
        self.store.end_renewal(&self.key, self.version);
    }
}
