//! Response DTOs for the cache HTTP adapter
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;

/// Response body for the GET operation (GET /get/:key)
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    /// The requested key
    pub key: String,
    /// The stored value
    pub value: Value,
}

impl GetResponse {
    /// Creates a new GetResponse
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Response body for operations acting on one key (PUT /set, DELETE /del/:key)
#[derive(Debug, Clone, Serialize)]
pub struct KeyResponse {
    /// Success message
    pub message: String,
    /// The key that was acted on
    pub key: String,
}

impl KeyResponse {
    pub fn set(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
        }
    }

    pub fn deleted(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted successfully", key),
            key,
        }
    }
}

/// Response body for bulk operations (POST /clear, /prefetch, /warm, /predict)
#[derive(Debug, Clone, Serialize)]
pub struct BulkResponse {
    pub message: String,
    /// Keys acted on, where meaningful
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
    /// Number of keys stored, where meaningful
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded: Option<usize>,
}

impl BulkResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            keys: Vec::new(),
            loaded: None,
        }
    }

    pub fn with_keys(mut self, keys: Vec<String>) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_loaded(mut self, loaded: usize) -> Self {
        self.loaded = Some(loaded);
        self
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_response_serialize() {
        let resp = GetResponse::new("test_key", json!({"score": 12}));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("test_key"));
        assert!(json.contains("\"score\":12"));
    }

    #[test]
    fn test_key_response_messages() {
        let set = serde_json::to_string(&KeyResponse::set("my_key")).unwrap();
        assert!(set.contains("my_key"));
        assert!(set.contains("set successfully"));

        let deleted = serde_json::to_string(&KeyResponse::deleted("gone")).unwrap();
        assert!(deleted.contains("deleted"));
    }

    #[test]
    fn test_bulk_response_skips_empty_fields() {
        let json = serde_json::to_value(BulkResponse::new("Cache cleared")).unwrap();
        assert_eq!(json, json!({"message": "Cache cleared"}));

        let json = serde_json::to_value(
            BulkResponse::new("Warmed").with_keys(vec!["a".to_string()]).with_loaded(1),
        )
        .unwrap();
        assert_eq!(json["keys"], json!(["a"]));
        assert_eq!(json["loaded"], json!(1));
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }
}
