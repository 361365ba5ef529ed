//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Cache and server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Capacity budget in bytes (estimated, serialized size)
    pub max_size_bytes: usize,
    /// Default TTL in seconds for entries without explicit TTL
    pub default_ttl: u64,
    /// Payloads larger than this many bytes are compressed
    pub compression_threshold: usize,
    /// Whether lz4 compression is used at all
    pub compression_enabled: bool,
    /// Fraction of the budget freed beyond the strict overflow on eviction
    pub eviction_margin: f64,
    /// Background expiry sweep interval in seconds
    pub sweep_interval: u64,
    /// Number of latency samples kept for averaging
    pub latency_samples: usize,
    /// Directory for persisted entries, None disables persistence
    pub persist_dir: Option<PathBuf>,
    /// Delay between staggered predictive loads in milliseconds
    pub predict_stagger_ms: u64,
    /// Keys loaded at high priority on startup
    pub warm_keys: Vec<String>,
    /// Base URL of the upstream data source
    pub upstream_url: Option<String>,
    /// HTTP server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_BYTES` - Capacity budget in bytes (default: 50 MiB)
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `CACHE_COMPRESSION_THRESHOLD` - Compression threshold in bytes (default: 10240)
    /// - `CACHE_COMPRESSION_ENABLED` - Enable lz4 compression (default: true)
    /// - `CACHE_EVICTION_MARGIN` - Extra fraction freed on eviction (default: 0.1)
    /// - `CACHE_SWEEP_INTERVAL` - Expiry sweep frequency in seconds (default: 300)
    /// - `CACHE_LATENCY_SAMPLES` - Latency ring buffer size (default: 1000)
    /// - `CACHE_PERSIST_DIR` - Persistence directory, empty disables (default: .cache)
    /// - `CACHE_PREDICT_STAGGER_MS` - Delay between predictive loads (default: 500)
    /// - `CACHE_WARM_KEYS` - Comma-separated keys warmed at startup (default: none)
    /// - `CACHE_UPSTREAM_URL` - Upstream data source base URL (default: none)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let persist_dir = match env::var("CACHE_PERSIST_DIR") {
            Ok(v) if v.trim().is_empty() => None,
            Ok(v) => Some(PathBuf::from(v)),
            Err(_) => defaults.persist_dir,
        };

        let warm_keys = env::var("CACHE_WARM_KEYS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let upstream_url = env::var("CACHE_UPSTREAM_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());

        Self {
            max_size_bytes: parse_var("CACHE_MAX_BYTES", defaults.max_size_bytes),
            default_ttl: parse_var("CACHE_DEFAULT_TTL", defaults.default_ttl),
            compression_threshold: parse_var(
                "CACHE_COMPRESSION_THRESHOLD",
                defaults.compression_threshold,
            ),
            compression_enabled: parse_var(
                "CACHE_COMPRESSION_ENABLED",
                defaults.compression_enabled,
            ),
            eviction_margin: parse_var("CACHE_EVICTION_MARGIN", defaults.eviction_margin)
                .clamp(0.0, 1.0),
            sweep_interval: parse_var("CACHE_SWEEP_INTERVAL", defaults.sweep_interval),
            latency_samples: parse_var("CACHE_LATENCY_SAMPLES", defaults.latency_samples),
            persist_dir,
            predict_stagger_ms: parse_var("CACHE_PREDICT_STAGGER_MS", defaults.predict_stagger_ms),
            warm_keys,
            upstream_url,
            server_port: parse_var("SERVER_PORT", defaults.server_port),
        }
    }

    /// Default TTL as a Duration.
    pub fn default_ttl_duration(&self) -> Duration {
        Duration::from_secs(self.default_ttl)
    }
}

/// Reads and parses an environment variable, falling back to `default`.
fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_size_bytes: 50 * 1024 * 1024,
            default_ttl: 300,
            compression_threshold: 10 * 1024,
            compression_enabled: true,
            eviction_margin: 0.1,
            sweep_interval: 300,
            latency_samples: 1000,
            persist_dir: Some(PathBuf::from(".cache")),
            predict_stagger_ms: 500,
            warm_keys: Vec::new(),
            upstream_url: None,
            server_port: 3000,
        }
    }
}
