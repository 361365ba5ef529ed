//! API Handlers
//!
//! HTTP request handlers adapting JSON requests onto the cache manager.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;

use crate::cache::{CacheManager, CacheStats, DataSource, UsageContext};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    validate_key, BulkResponse, GetResponse, HealthResponse, KeyResponse, KeysRequest, SetRequest,
};

/// Application state shared across all handlers.
///
/// `CacheManager` is already a cheap, cloneable handle.
#[derive(Clone)]
pub struct AppState {
    pub cache: CacheManager,
}

impl AppState {
    /// Creates a new AppState with the given cache manager.
    pub fn new(cache: CacheManager) -> Self {
        Self { cache }
    }

    /// Creates an in-memory AppState from configuration.
    pub fn from_config(config: &Config, source: Arc<dyn DataSource>) -> Self {
        Self::new(CacheManager::new(config, source))
    }
}

/// Handler for PUT /set
///
/// Stores a JSON value with optional TTL, priority and compression override.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<KeyResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    state.cache.set(&req.key, &req.value, req.options()).await?;

    Ok(Json(KeyResponse::set(req.key)))
}

/// Handler for GET /get/:key
///
/// Absent and expired keys both answer 404.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    match state.cache.get::<Value>(&key).await {
        Some(value) => Ok(Json(GetResponse::new(key, value))),
        None => Err(CacheError::NotFound(key)),
    }
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<KeyResponse>> {
    if state.cache.delete(&key).await {
        Ok(Json(KeyResponse::deleted(key)))
    } else {
        Err(CacheError::NotFound(key))
    }
}

/// Handler for POST /clear
pub async fn clear_handler(State(state): State<AppState>) -> Json<BulkResponse> {
    state.cache.clear().await;
    Json(BulkResponse::new("Cache cleared"))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.cache.stats().await)
}

/// Handler for POST /prefetch
///
/// Reads each key and loads misses from the data source.
pub async fn prefetch_handler(
    State(state): State<AppState>,
    Json(req): Json<KeysRequest>,
) -> Result<Json<BulkResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    state.cache.prefetch(&req.keys).await;
    Ok(Json(BulkResponse::new("Prefetch complete").with_keys(req.keys)))
}

/// Handler for POST /warm
pub async fn warm_handler(
    State(state): State<AppState>,
    Json(req): Json<KeysRequest>,
) -> Result<Json<BulkResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let loaded = state.cache.warm(&req.keys).await;
    Ok(Json(
        BulkResponse::new("Warm complete")
            .with_keys(req.keys)
            .with_loaded(loaded),
    ))
}

/// Handler for POST /predict
///
/// Returns as soon as the predicted loads are scheduled.
pub async fn predict_handler(
    State(state): State<AppState>,
    Json(context): Json<UsageContext>,
) -> Result<Json<BulkResponse>> {
    if let Some(error_msg) = validate_key(context.current_topic.trim()) {
        return Err(CacheError::InvalidRequest(format!("Invalid topic: {}", error_msg)));
    }

    let scheduled = state.cache.predictive_cache(&context).await;
    Ok(Json(
        BulkResponse::new(format!("Scheduled {} predictive loads", scheduled.len()))
            .with_keys(scheduled),
    ))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
