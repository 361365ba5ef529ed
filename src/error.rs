//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Errors surfaced to callers of the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Entry cannot fit even after evicting everything else
    #[error("Entry '{key}' is too large: {size} bytes exceeds budget of {budget} bytes")]
    EntryTooLarge {
        key: String,
        size: usize,
        budget: usize,
    },

    /// Value could not be serialized, nothing was stored
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Key not found in cache (HTTP adapter only)
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == Codec Error Enum ==
/// Errors raised while encoding or decoding entry payloads.
///
/// None of these reach a `get` caller; they are recovered as plain storage or
/// as a cache miss.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

// == Persistence Error Enum ==
/// Errors from the durable mirror. Logged, never propagated to cache callers.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::EntryTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            CacheError::Codec(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let test_cases = vec![
            (
                CacheError::EntryTooLarge {
                    key: "k".to_string(),
                    size: 10,
                    budget: 5,
                },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (CacheError::NotFound("key".to_string()), StatusCode::NOT_FOUND),
            (CacheError::InvalidRequest("bad".to_string()), StatusCode::BAD_REQUEST),
            (CacheError::Internal("error".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected_status) in test_cases {
            let response = error.into_response();
            assert_eq!(response.status(), expected_status);
        }
    }

    #[test]
    fn test_entry_too_large_message() {
        let err = CacheError::EntryTooLarge {
            key: "huge".to_string(),
            size: 2048,
            budget: 1024,
        };
        let msg = err.to_string();
        assert!(msg.contains("huge"));
        assert!(msg.contains("2048"));
        assert!(msg.contains("1024"));
    }
}
