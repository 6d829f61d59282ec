//! Refresh Coordinator Module
//!
//! Stale-while-revalidate reads. Per key, depending on remaining TTL:
//! - above the threshold: the cached value is returned as is
//! - at or below the threshold: the cached value is returned and one
//!   background recomputation is started
//! - expired or absent: the caller waits for a recomputation, like a miss

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::populate::{decode, erase, Populate, ValueFactory, WriteMode};
use crate::cache::{category_of, CacheOptions, CacheStore, SingleFlight, StatisticsCollector};
use crate::error::Result;

// == Refresh Coordinator ==
#[derive(Debug, Clone)]
pub struct RefreshCoordinator {
    store: Arc<CacheStore>,
    stats: Arc<StatisticsCollector>,
    flights: Arc<SingleFlight<Value>>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<CacheStore>,
        stats: Arc<StatisticsCollector>,
        flights: Arc<SingleFlight<Value>>,
    ) -> Self {
        Self {
            store,
            stats,
            flights,
        }
    }

    // == Get Or Refresh ==
    /// Reads `key`, refreshing it in the background once its remaining TTL
    /// drops to `refresh_threshold` or below.
    ///
    /// A renewed entry keeps the tags of the entry it replaces; `options.tags`
    /// only apply when the key has to be computed from scratch. Background
    /// failures are logged and leave the current entry in place.
    pub async fn get_or_refresh<T, F, Fut>(
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
        let factory = erase(key, factory);
        let value = self
            .get_or_refresh_value(key, ttl, refresh_threshold, options, factory)
            .await?;
        decode(value)
    }

    async fn get_or_refresh_value(
        &self,
        key: &str,
        ttl: Duration,
        refresh_threshold: Duration,
        options: &CacheOptions,
        factory: ValueFactory,
    ) -> Result<Value> {
        let category = category_of(key);

        let Some(entry) = self.store.get(key) else {
            self.stats.record_miss(category);
            debug!(key = %key, "refresh-behind miss");
            let populate = self.populate(key, ttl, options.clone(), WriteMode::Replace);
            return self
                .flights
                .execute(key, move || populate.run(factory))
                .await;
        };

        self.stats.record_hit(category);
        let remaining = entry.ttl_remaining();
        if remaining > refresh_threshold {
            return Ok(entry.value);
        }

        // Rewritten or removed since our read: nothing left to renew
        let Some(renewal) = self.store.begin_renewal(key, entry.version) else {
            return Ok(entry.value);
        };
        let renewed_options = CacheOptions {
            tags: entry.tags.clone(),
            ..options.clone()
        };
        let populate = self.populate(key, ttl, renewed_options, WriteMode::Renew(renewal));
        let owner = key.to_string();
        let started = self.flights.execute_detached(key, move || async move {
            let result = populate.run(factory).await;
            if let Err(err) = &result {
                warn!(key = %owner, error = %err, "background refresh failed, keeping current entry");
            }
            result
        });
        debug!(
            key = %key,
            remaining_ms = remaining.as_millis() as u64,
            started,
            "serving entry while refreshing"
        );

        Ok(entry.value)
    }

    fn populate(&self, key: &str, ttl: Duration, options: CacheOptions, mode: WriteMode) -> Populate {
        Populate {
            store: self.store.clone(),
            stats: self.stats.clone(),
            key: key.to_string(),
            ttl,
            options,
            mode,
        }
    }
}
