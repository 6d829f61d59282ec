//! API Routes
//!
//! Configures the Axum router with all admin endpoints.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    category_stats_handler, clear_stats_handler, delete_handler, get_handler, health_handler,
    invalidate_pattern_handler, invalidate_tags_handler, set_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `PUT /set` - Store a value with optional TTL and tags
/// - `GET /get/:key` - Retrieve a value and its metadata
/// - `DELETE /del/:key` - Delete a key
/// - `POST /invalidate/tags` - Remove entries carrying any of the given tags
/// - `POST /invalidate/pattern` - Remove entries whose key matches a regex
/// - `GET /stats` - Statistics for every category
/// - `GET /stats/:category` - Statistics for one category
/// - `DELETE /stats` - Reset statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/set", put(set_handler))
        .route("/get/:key", get(get_handler))
        .route("/del/:key", delete(delete_handler))
        .route("/invalidate/tags", post(invalidate_tags_handler))
        .route("/invalidate/pattern", post(invalidate_pattern_handler))
        .route("/stats", get(stats_handler).delete(clear_stats_handler))
        .route("/stats/:category", get(category_stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
