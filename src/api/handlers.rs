//! API Handlers
//!
//! HTTP request handlers for each admin endpoint.

use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;

use crate::cache::CacheService;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    AllStatsResponse, DeleteResponse, GetResponse, HealthResponse, InvalidatePatternRequest,
    InvalidateResponse, InvalidateTagsRequest, SetRequest, SetResponse, StatsResponse,
};

/// Application state shared across all handlers.
///
/// `CacheService` is internally synchronized, so no outer lock is needed.
#[derive(Clone)]
pub struct AppState {
    pub cache: CacheService,
    /// TTL for sets that do not specify one
    pub default_ttl: Duration,
}

impl AppState {
    /// Creates a new AppState around an existing cache service.
    pub fn new(cache: CacheService, default_ttl: Duration) -> Self {
        Self { cache, default_ttl }
    }

    /// Creates a new AppState with a fresh cache service from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(CacheService::new(), config.default_ttl)
    }
}

/// Handler for PUT /set
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let ttl = req
        .ttl
        .map(Duration::from_secs)
        .unwrap_or(state.default_ttl);
    state.cache.set_tagged(&req.key, &req.value, ttl, req.tags)?;

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    match state.cache.get_with_metadata::<Value>(&key)? {
        (Some(value), Some(metadata)) => Ok(Json(GetResponse::new(key, value, &metadata))),
        _ => Err(CacheError::NotFound(key)),
    }
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    if state.cache.remove_raw(&key) {
        Ok(Json(DeleteResponse::new(key)))
    } else {
        Err(CacheError::NotFound(key))
    }
}

/// Handler for POST /invalidate/tags
pub async fn invalidate_tags_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateTagsRequest>,
) -> Result<Json<InvalidateResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let removed = state.cache.invalidate_by_tags(&req.tags);
    Ok(Json(InvalidateResponse { removed }))
}

/// Handler for POST /invalidate/pattern
pub async fn invalidate_pattern_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidatePatternRequest>,
) -> Result<Json<InvalidateResponse>> {
    let removed = state.cache.invalidate_by_pattern(&req.pattern)?;
    Ok(Json(InvalidateResponse { removed }))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<AllStatsResponse> {
    Json(AllStatsResponse::new(
        state.cache.all_stats(),
        state.cache.len(),
    ))
}

/// Handler for GET /stats/:category
pub async fn category_stats_handler(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Json<StatsResponse> {
    let stats = state.cache.category_stats(&category);
    Json(StatsResponse::new(category, stats))
}

/// Handler for DELETE /stats
pub async fn clear_stats_handler(State(state): State<AppState>) -> Json<AllStatsResponse> {
    state.cache.clear_stats();
    Json(AllStatsResponse::new(
        state.cache.all_stats(),
        state.cache.len(),
    ))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
