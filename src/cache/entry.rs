//! Cache Entry Module
//!
//! Defines individual cache entries, their priority and TTL bookkeeping.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

// == Priority ==
/// Coarse importance tag governing eviction order and persistence eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Divisor applied to the eviction score; larger keeps an entry longer.
    pub fn weight(&self) -> f64 {
        match self {
            Priority::Critical => 10.0,
            Priority::High => 5.0,
            Priority::Medium => 2.0,
            Priority::Low => 1.0,
        }
    }

    /// Whether entries of this priority are mirrored to durable storage.
    pub fn is_persistent(&self) -> bool {
        !matches!(self, Priority::Low)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

// == Cache Entry ==
/// A single stored value with its metadata.
///
/// The payload is kept serialized (and possibly lz4-compressed) so the store
/// never needs to know the caller's value type.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Serialized payload bytes, compressed when `compressed_size` is set
    pub payload: Bytes,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Time to live in milliseconds
    pub ttl_ms: u64,
    pub priority: Priority,
    /// Successful reads since insertion
    pub access_count: u64,
    /// Last successful read (Unix milliseconds)
    pub last_accessed_at: u64,
    /// Length of the compressed payload, None when stored plain
    pub compressed_size: Option<usize>,
    /// Estimated footprint used for capacity accounting
    pub size_bytes: usize,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry stamped with the current time.
    pub fn new(
        key: &str,
        payload: Bytes,
        compressed: bool,
        ttl: Duration,
        priority: Priority,
    ) -> Self {
        Self::with_created_at(key, payload, compressed, ttl, priority, current_timestamp_ms())
    }

    /// Creates an entry with an explicit creation time, used when restoring
    /// persisted records.
    pub fn with_created_at(
        key: &str,
        payload: Bytes,
        compressed: bool,
        ttl: Duration,
        priority: Priority,
        created_at: u64,
    ) -> Self {
        let compressed_size = compressed.then_some(payload.len());
        let size_bytes = estimate_size(key, payload.len());

        Self {
            payload,
            created_at,
            ttl_ms: ttl.as_millis() as u64,
            priority,
            access_count: 0,
            last_accessed_at: created_at,
            compressed_size,
            size_bytes,
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed_size.is_some()
    }

    // == Is Expired ==
    /// An entry is live while `now - created_at < ttl`.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        now.saturating_sub(self.created_at) >= self.ttl_ms
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, 0 once expired.
    pub fn ttl_remaining_ms(&self) -> u64 {
        let elapsed = current_timestamp_ms().saturating_sub(self.created_at);
        self.ttl_ms.saturating_sub(elapsed)
    }

    // == Record Access ==
    /// Updates read-side metadata after a successful read.
    pub fn record_access(&mut self, now: u64) {
        self.access_count += 1;
        self.last_accessed_at = self.last_accessed_at.max(now);
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Heuristic footprint of an entry: key plus stored payload length.
pub fn estimate_size(key: &str, payload_len: usize) -> usize {
    key.len() + payload_len
}
