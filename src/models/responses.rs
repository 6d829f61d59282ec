//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::cache::{CategoryStats, EntryMetadata};

/// Entry metadata as exposed over HTTP
#[derive(Debug, Clone, Serialize)]
pub struct MetadataResponse {
    pub tags: BTreeSet<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Remaining TTL in milliseconds
    pub ttl_remaining_ms: u64,
}

impl From<&EntryMetadata> for MetadataResponse {
    fn from(metadata: &EntryMetadata) -> Self {
        Self {
            tags: metadata.tags.clone(),
            created_at: metadata.created_at_utc(),
            expires_at: metadata.expires_at_utc(),
            ttl_remaining_ms: metadata.ttl_remaining().as_millis() as u64,
        }
    }
}

/// Response body for the GET operation (GET /get/:key)
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub key: String,
    pub value: Value,
    pub metadata: MetadataResponse,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: Value, metadata: &EntryMetadata) -> Self {
        Self {
            key: key.into(),
            value,
            metadata: metadata.into(),
        }
    }
}

/// Response body for the SET operation (PUT /set)
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    /// Success message
    pub message: String,
    /// The key that was set
    pub key: String,
}

impl SetResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
        }
    }
}

/// Response body for the DELETE operation (DELETE /del/:key)
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    /// The key that was deleted
    pub key: String,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted successfully", key),
            key,
        }
    }
}

/// Response body for the invalidation endpoints
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    /// Number of live entries removed
    pub removed: usize,
}

/// Statistics for one category (GET /stats/:category)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub category: String,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub removals: u64,
    pub active_keys: usize,
    /// Hit ratio (hits / (hits + misses))
    pub hit_ratio: f64,
}

impl StatsResponse {
    pub fn new(category: impl Into<String>, stats: CategoryStats) -> Self {
        Self {
            category: category.into(),
            hits: stats.hits,
            misses: stats.misses,
            sets: stats.sets,
            removals: stats.removals,
            active_keys: stats.active_keys,
            hit_ratio: stats.hit_ratio(),
        }
    }
}

/// Statistics for every category (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct AllStatsResponse {
    pub categories: Vec<StatsResponse>,
    /// Entries physically stored, expired ones included
    pub total_entries: usize,
}

impl AllStatsResponse {
    pub fn new(stats: BTreeMap<String, CategoryStats>, total_entries: usize) -> Self {
        Self {
            categories: stats
                .into_iter()
                .map(|(category, stats)| StatsResponse::new(category, stats))
                .collect(),
            total_entries,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
