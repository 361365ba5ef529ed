//! API Module
//!
//! Thin HTTP adapter over `CacheManager`. The cache core knows nothing
//! about HTTP; values travel as arbitrary JSON.
//!
//! # Endpoints
//! - `PUT /set` - Store a JSON value
//! - `GET /get/:key` - Retrieve a value by key
//! - `DELETE /del/:key` - Delete a key
//! - `POST /clear` - Remove every entry
//! - `GET /stats` - Get cache statistics
//! - `POST /prefetch`, `POST /warm`, `POST /predict` - Population
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
