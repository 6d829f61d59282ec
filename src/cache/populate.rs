//! Populate Module
//!
//! Runs a value factory and writes its result back to the store, applying
//! the caller's `CacheOptions`. This is the body of every single-flight
//! computation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::cache::{category_of, CacheOptions, CacheStore, Renewal, StatisticsCollector};
use crate::error::{CacheError, Result};

/// A factory with its output already converted to the stored form.
pub type ValueFactory = Box<dyn FnOnce() -> BoxFuture<'static, Result<Value>> + Send>;

// == Erase ==
/// Wraps a typed factory so that failures become `FactoryFailure` for `key`
/// and its output is serialized.
pub fn erase<T, F, Fut>(key: &str, factory: F) -> ValueFactory
where
    T: Serialize + Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    let key = key.to_string();
    Box::new(move || {
        async move {
            let produced = factory()
                .await
                .map_err(|err| CacheError::factory(&key, &err))?;
            Ok(serde_json::to_value(produced)?)
        }
        .boxed()
    })
}

/// Converts a stored value back to the caller's type.
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

// == Write Mode ==
#[derive(Debug)]
pub enum WriteMode {
    /// Unconditional write; a live entry found before the factory runs is
    /// returned instead
    Replace,
    /// Write only over the entry generation being renewed. The guard keeps
    /// that generation from being evicted until the write lands or the
    /// computation ends.
    Renew(Renewal),
}

// == Populate ==
pub struct Populate {
    pub store: Arc<CacheStore>,
    pub stats: Arc<StatisticsCollector>,
    pub key: String,
    pub ttl: Duration,
    pub options: CacheOptions,
    pub mode: WriteMode,
}

impl Populate {
    pub async fn run(self, factory: ValueFactory) -> Result<Value> {
        // A previous flight may have filled the key between our miss and
        // this flight starting.
        if matches!(self.mode, WriteMode::Replace) {
            if let Some(entry) = self.store.get(&self.key) {
                trace!(key = %self.key, "filled by an earlier computation");
                return Ok(entry.value);
            }
        }

        let value = factory().await?;

        if !self.options.should_store(&value) {
            debug!(key = %self.key, "result not cached by policy");
            return Ok(value);
        }

        let category = category_of(&self.key);
        match self.mode {
            WriteMode::Replace => {
                self.store
                    .set(&self.key, value.clone(), self.ttl, self.options.tags);
                self.stats.record_set(category);
            }
            WriteMode::Renew(renewal) => {
                let written = renewal.complete(value.clone(), self.ttl, self.options.tags);
                match written {
                    Some(version) => {
                        self.stats.record_set(category);
                        debug!(key = %self.key, version, "entry refreshed");
                    }
                    None => {
                        debug!(key = %self.key, "entry changed during refresh, result discarded");
                    }
                }
            }
        }

        Ok(value)
    }
}
