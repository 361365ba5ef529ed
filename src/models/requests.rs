//! Request DTOs for the cache HTTP adapter
//!
//! Defines the structure of incoming HTTP request bodies.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::cache::{Priority, SetOptions, MAX_KEY_LENGTH};

/// Request body for the SET operation (PUT /set)
///
/// # Fields
/// - `key`: The cache key to store the value under
/// - `value`: Any JSON value
/// - `ttl`: Optional TTL in seconds (uses default if not specified)
/// - `priority`: Optional priority (`critical`, `high`, `medium`, `low`)
/// - `compress`: Optional compression override
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub ttl: Option<u64>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub compress: Option<bool>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        validate_key(&self.key)
    }

    /// Converts the optional fields into store options.
    pub fn options(&self) -> SetOptions {
        SetOptions {
            ttl: self.ttl.map(Duration::from_secs),
            priority: self.priority,
            compress: self.compress,
        }
    }
}

/// Request body for key list operations (POST /prefetch, POST /warm)
#[derive(Debug, Clone, Deserialize)]
pub struct KeysRequest {
    pub keys: Vec<String>,
}

impl KeysRequest {
    pub fn validate(&self) -> Option<String> {
        self.keys.iter().find_map(|key| validate_key(key))
    }
}

/// Shared key validation for all endpoints.
pub fn validate_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    if key.len() > MAX_KEY_LENGTH {
        return Some(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        ));
    }
    None
}
