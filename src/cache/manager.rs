//! Cache Manager
//!
//! The service callers hold: wraps the shared entry store, the persistence
//! writer, the predictive warmer and the expiry sweep behind one cloneable
//! handle. Constructed by the top-level process and shut down by it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{
    current_timestamp_ms, load_into, spawn_persistence_writer, CacheStats, DataSource,
    EntryStore, PersistenceBackend, PredictiveWarmer, SetOptions, SharedStore, UsageContext,
};
use crate::config::Config;
use crate::error::Result;
use crate::tasks::spawn_cleanup_task;

// == Cache Manager ==
/// Cloneable handle to a running cache.
#[derive(Clone)]
pub struct CacheManager {
    inner: Arc<Inner>,
}

struct Inner {
    store: SharedStore,
    source: Arc<dyn DataSource>,
    warmer: PredictiveWarmer,
    writer: Mutex<Option<JoinHandle<()>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CacheManager {
    // == Constructors ==
    /// Creates an in-memory cache without persistence.
    pub fn new(config: &Config, source: Arc<dyn DataSource>) -> Self {
        Self::from_store(EntryStore::from_config(config), config, source, None)
    }

    /// Creates a cache mirrored to `backend`, restoring live records first.
    ///
    /// Must be called from within a tokio runtime. Load failures are logged
    /// and the cache starts empty.
    pub async fn open(
        config: &Config,
        backend: Arc<dyn PersistenceBackend>,
        source: Arc<dyn DataSource>,
    ) -> Self {
        let mut store = EntryStore::from_config(config);

        let records = match backend.load_all().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Failed to load persisted entries, starting empty: {}", e);
                Vec::new()
            }
        };

        let (handle, writer) = spawn_persistence_writer(backend);
        store.attach_mirror(handle.clone());

        let now = current_timestamp_ms();
        let total = records.len();
        let mut restored = 0usize;
        let mut live: Vec<_> = records
            .into_iter()
            .filter(|record| {
                let expired = record.is_expired_at(now);
                if expired {
                    handle.remove(&record.key);
                }
                !expired
            })
            .collect();

        // Oldest first so newer records win any capacity contention
        live.sort_by_key(|record| record.created_at);
        for record in live {
            let key = record.key.clone();
            if store.restore(record) {
                restored += 1;
            } else {
                handle.remove(&key);
            }
        }

        info!(
            "Restored {} of {} persisted entries ({} bytes)",
            restored,
            total,
            store.total_size()
        );

        Self::from_store(store, config, source, Some(writer))
    }

    fn from_store(
        store: EntryStore,
        config: &Config,
        source: Arc<dyn DataSource>,
        writer: Option<JoinHandle<()>>,
    ) -> Self {
        let store = Arc::new(RwLock::new(store));
        let warmer = PredictiveWarmer::new(
            store.clone(),
            source.clone(),
            Duration::from_millis(config.predict_stagger_ms),
        );

        Self {
            inner: Arc::new(Inner {
                store,
                source,
                warmer,
                writer: Mutex::new(writer),
                sweeper: Mutex::new(None),
            }),
        }
    }

    /// The shared store, for background tasks.
    pub fn store(&self) -> SharedStore {
        self.inner.store.clone()
    }

    // == Core Operations ==
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: SetOptions,
    ) -> Result<()> {
        self.inner.store.write().await.set(key, value, options)
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.inner.store.write().await.get(key)
    }

    /// Returns whether the key was present.
    pub async fn delete(&self, key: &str) -> bool {
        self.inner.store.write().await.delete(key)
    }

    pub async fn clear(&self) {
        self.inner.store.write().await.clear();
        info!("Cache cleared");
    }

    /// Live-entry check that does not count as a read.
    pub async fn contains(&self, key: &str) -> bool {
        self.inner.store.read().await.contains(key)
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.store.read().await.stats()
    }

    pub async fn cleanup_expired(&self) -> usize {
        self.inner.store.write().await.cleanup_expired()
    }

    // == Prefetch ==
    /// Reads every key and loads misses from the data source at default
    /// priority. Each read counts towards hit/miss stats.
    pub async fn prefetch(&self, keys: &[String]) {
        let loads = keys.iter().map(|key| async move {
            if self.get::<Value>(key).await.is_some() {
                return false;
            }
            load_into(
                &self.inner.store,
                self.inner.source.as_ref(),
                key,
                SetOptions::new(),
            )
            .await
        });

        let loaded = futures::future::join_all(loads)
            .await
            .into_iter()
            .filter(|stored| *stored)
            .count();
        debug!("Prefetch: {} of {} keys loaded from source", loaded, keys.len());
    }

    // == Warming ==
    /// Loads essential keys at high priority. Returns how many were stored.
    pub async fn warm(&self, keys: &[String]) -> usize {
        self.inner.warmer.warm(keys).await
    }

    /// Schedules low-priority loads for keys predicted from `context`;
    /// returns the scheduled keys without waiting for them.
    pub async fn predictive_cache(&self, context: &UsageContext) -> Vec<String> {
        self.inner.warmer.predictive_cache(context).await
    }

    // == Background Sweep ==
    /// Starts (or restarts) the periodic expiry sweep.
    pub fn start_sweeper(&self, interval: Duration) {
        let handle = spawn_cleanup_task(self.store(), interval);
        if let Some(previous) = self.inner.sweeper.lock().replace(handle) {
            previous.abort();
        }
    }

    // == Shutdown ==
    /// Stops background work and waits for queued persistence writes.
    pub async fn shutdown(&self) {
        if let Some(sweeper) = self.inner.sweeper.lock().take() {
            sweeper.abort();
        }
        self.inner.warmer.cancel_pending();

        // Dropping the last handle lets the writer drain and exit
        drop(self.inner.store.write().await.detach_mirror());

        let writer = self.inner.writer.lock().take();
        if let Some(writer) = writer {
            if let Err(e) = writer.await {
                warn!("Persistence writer ended abnormally: {}", e);
            }
        }

        info!("Cache manager shut down");
    }
}
