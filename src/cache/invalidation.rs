//! Invalidation Engine Module
//!
//! Bulk removal by tag, regex pattern or key prefix.
//!
//! Every bulk operation works from a snapshot of matching keys taken from
//! the index, then removes them one at a time. Each single removal is atomic
//! for readers, but the operation as a whole is not: a key created while the
//! snapshot is taken may or may not be removed.

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info};

use crate::cache::{category_of, CacheStore, StatisticsCollector};
use crate::error::{CacheError, Result};

// == Invalidation Engine ==
#[derive(Debug, Clone)]
pub struct InvalidationEngine {
    store: Arc<CacheStore>,
    stats: Arc<StatisticsCollector>,
}

impl InvalidationEngine {
    pub fn new(store: Arc<CacheStore>, stats: Arc<StatisticsCollector>) -> Self {
        Self { store, stats }
    }

    // == By Tags ==
    /// Removes every live entry carrying at least one of `tags`.
    ///
    /// Tags are re-checked under each key's lock, so a key re-set without
    /// the tags after the snapshot survives.
    pub fn invalidate_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> usize {
        if tags.is_empty() {
            return 0;
        }

        let candidates = self.store.index().keys_with_any_tag(tags);
        let removed = candidates
            .iter()
            .filter(|key| self.store.remove_if(key, |entry| entry.has_any_tag(tags)))
            .inspect(|key| self.stats.record_removal(category_of(key)))
            .count();

        let requested: Vec<&str> = tags.iter().map(|tag| tag.as_ref()).collect();
        info!(tags = ?requested, removed, "invalidated by tags");
        removed
    }

    // == By Pattern ==
    /// Removes every live entry whose key contains a match for `pattern`.
    ///
    /// The pattern is not anchored; use `^`/`$` to match whole keys. A
    /// malformed pattern fails before anything is removed.
    pub fn invalidate_by_pattern(&self, pattern: &str) -> Result<usize> {
        let regex = Regex::new(pattern).map_err(|err| CacheError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: err.to_string(),
        })?;

        let removed = self.remove_keys(self.store.index().keys_matching(&regex));
        info!(pattern = %pattern, removed, "invalidated by pattern");
        Ok(removed)
    }

    // == By Prefix ==
    pub fn invalidate_by_prefix(&self, prefix: &str) -> usize {
        let removed = self.remove_keys(self.store.keys(Some(prefix)));
        info!(prefix = %prefix, removed, "invalidated by prefix");
        removed
    }

    /// Removes every entry.
    pub fn invalidate_all(&self) -> usize {
        let removed = self.remove_keys(self.store.index().keys());
        info!(removed, "invalidated all entries");
        removed
    }

    fn remove_keys(&self, keys: Vec<String>) -> usize {
        debug!(candidates = keys.len(), "removing snapshot of keys");
        keys.iter()
            .filter(|key| self.store.remove(key))
            .inspect(|key| self.stats.record_removal(category_of(key)))
            .count()
    }
}
