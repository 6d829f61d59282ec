//! Memo Cache - An in-process caching and invalidation engine
//!
//! Memoizes computed values behind string keys with per-entry TTL, tag and
//! regex invalidation, single-flight population, refresh-behind reads and
//! per-category statistics. An optional admin HTTP surface exposes the
//! invalidation and statistics entry points.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheOptions, CacheService, WarmUpEntry, WarmUpReport};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::spawn_cleanup_task;
