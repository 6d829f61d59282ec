//! Cache Module
//!
//! In-process caching with TTL expiration, tag and pattern invalidation,
//! single-flight population and refresh-behind reads.

mod entry;
mod index;
mod invalidation;
mod populate;
mod refresh;
mod service;
mod single_flight;
mod stats;
mod store;
mod warm_up;


// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry, CacheOptions, EntryMetadata};
pub use index::MetadataIndex;
pub use invalidation::InvalidationEngine;
pub use refresh::RefreshCoordinator;
pub use service::CacheService;
pub use single_flight::SingleFlight;
pub use stats::{category_of, CategoryStats, StatisticsCollector, CATEGORY_DELIMITER};
pub use store::{CacheStore, Renewal};
pub use warm_up::{WarmUpEntry, WarmUpReport};
