//! Cache Service Module
//!
//! The public face of the engine. One `CacheService` is built explicitly at
//! startup and cloned into whatever needs it; clones share the same store,
//! statistics and in-flight computations.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::populate::{decode, erase, Populate, ValueFactory, WriteMode};
use crate::cache::warm_up::WarmUpOutcome;
use crate::cache::{
    category_of, CacheOptions, CacheStore, CategoryStats, EntryMetadata, InvalidationEngine,
    RefreshCoordinator, SingleFlight, StatisticsCollector, WarmUpEntry, WarmUpReport,
};
use crate::error::Result;

// == Cache Service ==
#[derive(Debug, Clone)]
pub struct CacheService {
    store: Arc<CacheStore>,
    stats: Arc<StatisticsCollector>,
    flights: Arc<SingleFlight<Value>>,
    invalidation: InvalidationEngine,
    refresh: RefreshCoordinator,
}

impl Default for CacheService {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheService {
    // == Constructor ==
    pub fn new() -> Self {
        let store = Arc::new(CacheStore::new());
        let stats = Arc::new(StatisticsCollector::new());
        let flights = Arc::new(SingleFlight::new());

        Self {
            invalidation: InvalidationEngine::new(store.clone(), stats.clone()),
            refresh: RefreshCoordinator::new(store.clone(), stats.clone(), flights.clone()),
            store,
            stats,
            flights,
        }
    }

    // == Cache (get or populate) ==
    /// Returns the cached value for `key`, or runs `factory` once (however
    /// many callers are waiting) and caches its result with default
    /// options.
    ///
    /// Factory errors reach every waiting caller and are never cached.
    pub async fn cache<T, F, Fut>(&self, key: &str, ttl: Duration, factory: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.cache_with_options(key, ttl, &CacheOptions::default(), factory)
            .await
    }

    pub async fn cache_with_options<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        options: &CacheOptions,
        factory: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let category = category_of(key);
        if let Some(entry) = self.store.get(key) {
            self.stats.record_hit(category);
            debug!(key = %key, "cache hit");
            return decode(entry.value);
        }

        self.stats.record_miss(category);
        debug!(key = %key, "cache miss");
        let value = self
            .populate(key, ttl, options.clone(), erase(key, factory))
            .await?;
        decode(value)
    }

    async fn populate(
        &self,
        key: &str,
        ttl: Duration,
        options: CacheOptions,
        factory: ValueFactory,
    ) -> Result<Value> {
        let populate = Populate {
            store: self.store.clone(),
            stats: self.stats.clone(),
            key: key.to_string(),
            ttl,
            options,
            mode: WriteMode::Replace,
        };
        self.flights
            .execute(key, move || populate.run(factory))
            .await
    }

    // == Reads ==
    /// Returns the live value for `key`, if any.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let (value, _) = self.get_with_metadata(key)?;
        Ok(value)
    }

    /// Returns the live value for `key` together with its metadata.
    pub fn get_with_metadata<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<(Option<T>, Option<EntryMetadata>)> {
        let category = category_of(key);
        match self.store.get(key) {
            Some(entry) => {
                self.stats.record_hit(category);
                let metadata = entry.metadata(key);
                Ok((Some(decode(entry.value)?), Some(metadata)))
            }
            None => {
                self.stats.record_miss(category);
                Ok((None, None))
            }
        }
    }

    /// Presence check that does not count as a read.
    pub fn contains_key(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }

    /// Live keys, optionally restricted to a prefix.
    pub fn keys(&self, prefix: Option<&str>) -> Vec<String> {
        self.store.keys(prefix)
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    // == Raw Writes ==
    /// Stores a value without tags, bypassing the null/empty policy.
    pub fn set_raw<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        self.set_tagged::<T, _, String>(key, value, ttl, [])
    }

    /// Stores a value with tags, bypassing the null/empty policy.
    pub fn set_tagged<T, I, S>(&self, key: &str, value: &T, ttl: Duration, tags: I) -> Result<()>
    where
        T: Serialize + ?Sized,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let value = serde_json::to_value(value)?;
        self.store
            .set(key, value, ttl, tags.into_iter().map(Into::into).collect());
        self.stats.record_set(category_of(key));
        Ok(())
    }

    /// Removes a key. Returns true if a live entry was removed.
    pub fn remove_raw(&self, key: &str) -> bool {
        let removed = self.store.remove(key);
        if removed {
            self.stats.record_removal(category_of(key));
        }
        removed
    }

    // == Invalidation ==
    pub fn invalidate_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> usize {
        self.invalidation.invalidate_by_tags(tags)
    }

    pub fn invalidate_by_pattern(&self, pattern: &str) -> Result<usize> {
        self.invalidation.invalidate_by_pattern(pattern)
    }

    pub fn invalidate_by_prefix(&self, prefix: &str) -> usize {
        self.invalidation.invalidate_by_prefix(prefix)
    }

    /// Removes every entry.
    pub fn clear(&self) -> usize {
        self.invalidation.invalidate_all()
    }

    // == Refresh Behind ==
    /// Stale-while-revalidate read; see [`RefreshCoordinator::get_or_refresh`].
    pub async fn refresh_behind<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        refresh_threshold: Duration,
        factory: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.refresh
            .get_or_refresh(key, ttl, refresh_threshold, &CacheOptions::default(), factory)
            .await
    }

    pub async fn refresh_behind_with_options<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        refresh_threshold: Duration,
        options: &CacheOptions,
        factory: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.refresh
            .get_or_refresh(key, ttl, refresh_threshold, options, factory)
            .await
    }

    // == Statistics ==
    /// Counters for one category plus its live key count.
    pub fn category_stats(&self, category: &str) -> CategoryStats {
        let active = self
            .store
            .keys(None)
            .iter()
            .filter(|key| category_of(key) == category)
            .count();
        self.stats.snapshot(category).with_active_keys(active)
    }

    /// Counters for every category seen since the last `clear_stats`.
    pub fn all_stats(&self) -> BTreeMap<String, CategoryStats> {
        let keys = self.store.keys(None);
        let mut active: HashMap<&str, usize> = HashMap::new();
        for key in &keys {
            *active.entry(category_of(key)).or_default() += 1;
        }

        self.stats
            .all_snapshots()
            .into_iter()
            .map(|(category, stats)| {
                let count = active.get(category.as_str()).copied().unwrap_or(0);
                (category, stats.with_active_keys(count))
            })
            .collect()
    }

    pub fn clear_stats(&self) {
        self.stats.clear();
        info!("statistics cleared");
    }

    // == Warm Up ==
    /// Populates every key that has no live entry yet. Factories run
    /// concurrently; one failing does not stop the others.
    pub async fn warm_up(&self, entries: Vec<WarmUpEntry>) -> WarmUpReport {
        let batch = entries.len();
        let runs = entries.into_iter().map(|entry| async move {
            let WarmUpEntry {
                key,
                ttl,
                options,
                factory,
            } = entry;

            if self.store.contains_key(&key) {
                return WarmUpOutcome::Skipped;
            }
            match self.populate(&key, ttl, options, factory).await {
                Ok(_) => WarmUpOutcome::Populated,
                Err(err) => {
                    warn!(key = %key, error = %err, "warm-up failed for key");
                    WarmUpOutcome::Failed
                }
            }
        });

        let report: WarmUpReport = join_all(runs).await.into_iter().collect();
        info!(
            batch,
            populated = report.populated,
            skipped = report.skipped,
            failed = report.failed,
            "warm-up finished"
        );
        report
    }

    // == Maintenance ==
    /// Physically drops expired entries. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired()
    }

    /// Keys with a computation in progress.
    pub fn in_flight(&self) -> usize {
        self.flights.in_flight()
    }
}
