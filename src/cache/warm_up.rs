//! Warm-Up Module
//!
//! Entries for best-effort cache population at startup.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;

use crate::cache::populate::{erase, ValueFactory};
use crate::cache::CacheOptions;

// == Warm-Up Entry ==
/// A key to populate, with its TTL, options and factory.
pub struct WarmUpEntry {
    pub(crate) key: String,
    pub(crate) ttl: Duration,
    pub(crate) options: CacheOptions,
    pub(crate) factory: ValueFactory,
}

impl WarmUpEntry {
    pub fn new<T, F, Fut>(key: impl Into<String>, ttl: Duration, factory: F) -> Self
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let key = key.into();
        let factory = erase(&key, factory);
        Self {
            key,
            ttl,
            options: CacheOptions::default(),
            factory,
        }
    }

    pub fn with_options(mut self, options: CacheOptions) -> Self {
        self.options = options;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Debug for WarmUpEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarmUpEntry")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

// == Warm-Up Report ==
/// Outcome counts of one warm-up batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WarmUpReport {
    /// Factories that completed
    pub populated: usize,
    /// Keys that already held a live entry
    pub skipped: usize,
    /// Factories that failed
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WarmUpOutcome {
    Populated,
    Skipped,
    Failed,
}

impl FromIterator<WarmUpOutcome> for WarmUpReport {
    fn from_iter<I: IntoIterator<Item = WarmUpOutcome>>(outcomes: I) -> Self {
        outcomes
            .into_iter()
            .fold(WarmUpReport::default(), |mut report, outcome| {
                match outcome {
                    WarmUpOutcome::Populated => report.populated += 1,
                    WarmUpOutcome::Skipped => report.skipped += 1,
                    WarmUpOutcome::Failed => report.failed += 1,
                }
                report
            })
    }
}
