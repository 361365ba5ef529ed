//! Adaptive Cache - A priority-aware in-memory cache
//!
//! Provides a byte-budgeted store with per-entry TTL, scored eviction,
//! lz4 payload compression, write-behind persistence and predictive warming.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::CacheManager;
pub use config::Config;
pub use tasks::spawn_cleanup_task;
