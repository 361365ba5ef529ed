//! Cache Module
//!
//! Size-bounded caching with TTL expiry, priority-aware eviction, optional
//! lz4 compression, write-behind persistence and predictive warming.

mod codec;
mod entry;
mod eviction;
mod manager;
mod persistence;
mod presets;
mod source;
mod stats;
mod store;
mod warmer;


use std::sync::Arc;

use tokio::sync::RwLock;

// Re-export public types
pub use codec::{CompressionCodec, EncodedPayload};
pub use entry::{current_timestamp_ms, estimate_size, CacheEntry, Priority};
pub use eviction::EvictionPolicy;
pub use manager::CacheManager;
pub use persistence::{
    spawn_persistence_writer, FileBackend, MemoryBackend, PersistedRecord, PersistenceBackend,
    PersistenceHandle,
};
pub use presets::Preset;
pub use source::{DataSource, HttpSource, NoopSource, StaticSource};
pub use stats::{CacheStats, StatsTracker};
pub use store::{EntryStore, SetOptions};
pub use warmer::{
    load_if_absent, load_into, Difficulty, PredictiveWarmer, UsageContext,
    MAX_PREDICTIONS,
};

/// Entry store shared between foreground calls and background tasks.
pub type SharedStore = Arc<RwLock<EntryStore>>;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
