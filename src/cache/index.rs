//! Metadata Index Module
//!
//! Per-key metadata plus a tag -> keys reverse index, so tag and pattern
//! invalidation never have to touch stored values.
//!
//! The index is only written by `CacheStore` while it holds the entry's
//! lock, which keeps the two consistent. Lock order is always
//! store entry -> `records` -> `by_tag`; nothing here calls back into the store.

use std::collections::{BTreeSet, HashSet};

use dashmap::DashMap;
use regex::Regex;

use crate::cache::EntryMetadata;

// == Metadata Index ==
#[derive(Debug, Default)]
pub struct MetadataIndex {
    /// key -> metadata
    records: DashMap<String, EntryMetadata>,
    /// tag -> keys carrying it
    by_tag: DashMap<String, HashSet<String>>,
}

impl MetadataIndex {
    pub fn new() -> Self {
        Self::default()
    }

    // == Record ==
    /// Records metadata for a key, replacing any previous record and its
    /// tag links.
    pub fn record(&self, metadata: EntryMetadata) {
        let key = metadata.key.clone();
        for tag in &metadata.tags {
            self.by_tag
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
        }

        let current = metadata.tags.clone();
        if let Some(previous) = self.records.insert(key.clone(), metadata) {
            for tag in previous.tags.difference(&current) {
                self.unlink(tag, &key);
            }
        }
    }

    // == Remove ==
    /// Drops a key's record and tag links.
    pub fn remove(&self, key: &str) -> Option<EntryMetadata> {
        let (_, metadata) = self.records.remove(key)?;
        for tag in &metadata.tags {
            self.unlink(tag, key);
        }
        Some(metadata)
    }

    fn unlink(&self, tag: &str, key: &str) {
        let now_empty = match self.by_tag.get_mut(tag) {
            Some(mut keys) => {
                keys.remove(key);
                keys.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.by_tag.remove_if(tag, |_, keys| keys.is_empty());
        }
    }

    // == Keys With Tag ==
    pub fn keys_with_tag(&self, tag: &str) -> Vec<String> {
        self.by_tag
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Union of `keys_with_tag` over every tag, deduplicated and sorted.
    pub fn keys_with_any_tag<S: AsRef<str>>(&self, tags: &[S]) -> Vec<String> {
        let mut keys = BTreeSet::new();
        for tag in tags {
            if let Some(tagged) = self.by_tag.get(tag.as_ref()) {
                keys.extend(tagged.iter().cloned());
            }
        }
        keys.into_iter().collect()
    }

    // == Keys Matching ==
    /// Keys whose full string contains a match for `pattern`.
    ///
    /// Walks the index one shard at a time, so a key recorded or removed
    /// while the scan runs may or may not be reported.
    pub fn keys_matching(&self, pattern: &Regex) -> Vec<String> {
        self.records
            .iter()
            .filter(|record| pattern.is_match(record.key()))
            .map(|record| record.key().clone())
            .collect()
    }

    /// Snapshot of every indexed key.
    pub fn keys(&self) -> Vec<String> {
        self.records.iter().map(|r| r.key().clone()).collect()
    }

    pub fn tag_count(&self) -> usize {
        self.by_tag.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
