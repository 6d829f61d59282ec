//! API Module
//!
//! Admin HTTP surface over a shared `CacheService`.
//!
//! # Endpoints
//! - `PUT /set` - Store a value with optional TTL and tags
//! - `GET /get/:key` - Retrieve a value and its metadata
//! - `DELETE /del/:key` - Delete a key
//! - `POST /invalidate/tags` - Tag invalidation
//! - `POST /invalidate/pattern` - Regex invalidation
//! - `GET /stats`, `GET /stats/:category`, `DELETE /stats` - Statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
