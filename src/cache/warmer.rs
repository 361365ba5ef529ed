//! Predictive Warmer
//!
//! Populates the cache ahead of demand: eagerly for a fixed list of essential
//! keys, and lazily (staggered, low priority) for keys predicted from the
//! caller's usage context.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{DataSource, Priority, SetOptions, SharedStore};

/// Upper bound on keys derived from one usage context.
pub const MAX_PREDICTIONS: usize = 5;

/// Recent activity items considered when predicting.
const RECENT_ACTIVITY_WINDOW: usize = 2;

// == Difficulty ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    /// The level a learner is most likely to move on to.
    pub fn next(&self) -> Difficulty {
        match self {
            Difficulty::Easy => Difficulty::Medium,
            Difficulty::Medium | Difficulty::Hard => Difficulty::Hard,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

// == Usage Context ==
/// What the caller is doing right now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageContext {
    pub current_topic: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Most recent first
    #[serde(default)]
    pub recent_activity: Vec<String>,
}

impl UsageContext {
    pub fn new(current_topic: impl Into<String>, difficulty: Difficulty) -> Self {
        Self {
            current_topic: current_topic.into(),
            difficulty,
            recent_activity: Vec::new(),
        }
    }

    pub fn with_activity(mut self, activity: impl Into<String>) -> Self {
        self.recent_activity.push(activity.into());
        self
    }

    // == Predict Keys ==
    /// Candidate keys likely to be requested next, most likely first.
    pub fn predict_keys(&self) -> Vec<String> {
        let topic = slug(&self.current_topic);
        if topic.is_empty() {
            return Vec::new();
        }

        let mut keys = vec![format!("questions:{}:{}", topic, self.difficulty.as_str())];
        let next = self.difficulty.next();
        if next != self.difficulty {
            keys.push(format!("questions:{}:{}", topic, next.as_str()));
        }
        keys.push(format!("explanations:{}", topic));

        for activity in self.recent_activity.iter().take(RECENT_ACTIVITY_WINDOW) {
            let activity = slug(activity);
            if !activity.is_empty() {
                keys.push(format!("explanations:{}", activity));
            }
        }

        let mut unique = Vec::with_capacity(keys.len());
        for key in keys {
            if !unique.contains(&key) {
                unique.push(key);
            }
        }
        unique.truncate(MAX_PREDICTIONS);
        unique
    }
}

fn slug(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

// == Load Into Store ==
/// Fetches `key` from `source` and stores it. Returns true if stored.
///
/// The store lock is not held while fetching.
pub async fn load_into(
    store: &SharedStore,
    source: &dyn DataSource,
    key: &str,
    options: SetOptions,
) -> bool {
    let Some(value) = fetch_value(source, key).await else {
        return false;
    };

    match store.write().await.set(key, &value, options) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to cache '{}': {}", key, e);
            false
        }
    }
}

/// Like `load_into`, but only adds: a key written while the fetch was in
/// flight is left alone, and nothing is evicted to make room.
pub async fn load_if_absent(
    store: &SharedStore,
    source: &dyn DataSource,
    key: &str,
    options: SetOptions,
) -> bool {
    let Some(value) = fetch_value(source, key).await else {
        return false;
    };

    match store.write().await.insert_if_absent(key, &value, options) {
        Ok(inserted) => {
            if !inserted {
                debug!("Not caching '{}': already present or no free space", key);
            }
            inserted
        }
        Err(e) => {
            warn!("Failed to cache '{}': {}", key, e);
            false
        }
    }
}

async fn fetch_value(source: &dyn DataSource, key: &str) -> Option<Value> {
    match source.fetch(key).await {
        Ok(Some(value)) => Some(value),
        Ok(None) => {
            debug!("Source has no value for '{}'", key);
            None
        }
        Err(e) => {
            warn!("Failed to load '{}': {}", key, e);
            None
        }
    }
}

// == Predictive Warmer ==
/// Schedules background population of the store. Only ever adds entries.
pub struct PredictiveWarmer {
    store: SharedStore,
    source: Arc<dyn DataSource>,
    stagger: Duration,
    warm_priority: Priority,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl PredictiveWarmer {
    pub fn new(store: SharedStore, source: Arc<dyn DataSource>, stagger: Duration) -> Self {
        Self {
            store,
            source,
            stagger,
            warm_priority: Priority::High,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Priority used by `warm`, `High` unless overridden.
    pub fn with_warm_priority(mut self, priority: Priority) -> Self {
        self.warm_priority = priority;
        self
    }

    // == Warm ==
    /// Loads every key concurrently and waits for completion.
    ///
    /// Returns how many keys were stored.
    pub async fn warm(&self, keys: &[String]) -> usize {
        let options = SetOptions::new().priority(self.warm_priority);
        let loads = keys
            .iter()
            .map(|key| load_into(&self.store, self.source.as_ref(), key, options));

        let loaded = futures::future::join_all(loads)
            .await
            .into_iter()
            .filter(|stored| *stored)
            .count();

        info!("Cache warmed: {}/{} keys loaded", loaded, keys.len());
        loaded
    }

    // == Predictive Cache ==
    /// Schedules low-priority loads for keys predicted from `context` and
    /// returns immediately with the scheduled keys.
    ///
    /// Keys already live are skipped, checked again when their timer fires,
    /// and once more under the write lock that inserts them. Predictive loads
    /// never evict. The n-th scheduled key waits `n * stagger`.
    pub async fn predictive_cache(&self, context: &UsageContext) -> Vec<String> {
        let candidates = context.predict_keys();

        let mut scheduled = Vec::new();
        {
            let store = self.store.read().await;
            for key in candidates {
                if !store.contains(&key) {
                    scheduled.push(key);
                }
            }
        }

        let mut pending = self.pending.lock();
        pending.retain(|handle| !handle.is_finished());

        for (i, key) in scheduled.iter().enumerate() {
            let delay = self.stagger * i as u32;
            let store = self.store.clone();
            let source = self.source.clone();
            let key = key.clone();

            pending.push(tokio::spawn(async move {
                tokio::time::sleep(delay).await;

                if store.read().await.contains(&key) {
                    debug!("Predicted key '{}' already cached", key);
                    return;
                }

                let options = SetOptions::new().priority(Priority::Low);
                if load_if_absent(&store, source.as_ref(), &key, options).await {
                    debug!("Predictively cached '{}'", key);
                }
            }));
        }

        if !scheduled.is_empty() {
            debug!(
                "Scheduled {} predictive loads for topic '{}'",
                scheduled.len(),
                context.current_topic
            );
        }
        scheduled
    }

    /// Number of scheduled loads that have not finished yet.
    pub fn pending_count(&self) -> usize {
        let mut pending = self.pending.lock();
        pending.retain(|handle| !handle.is_finished());
        pending.len()
    }

    /// Cancels scheduled loads that have not run yet.
    pub fn cancel_pending(&self) {
        for handle in self.pending.lock().drain(..) {
            handle.abort();
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{
        spawn_persistence_writer, CompressionCodec, EntryStore, EvictionPolicy, MemoryBackend,
        StaticSource,
    };
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::RwLock;

    fn shared_store() -> SharedStore {
        shared_store_with_budget(1024 * 1024)
    }

    fn shared_store_with_budget(max_size_bytes: usize) -> SharedStore {
        Arc::new(RwLock::new(EntryStore::new(
            EvictionPolicy::new(max_size_bytes, 0.1),
            CompressionCodec::new(10 * 1024, true),
            Duration::from_secs(300),
            100,
        )))
    }

    #[test]
    fn test_predict_keys() {
        let context = UsageContext::new("Linear Algebra", Difficulty::Easy)
            .with_activity("eigenvalues")
            .with_activity("matrix rank")
            .with_activity("ignored");

        assert_eq!(
            context.predict_keys(),
            vec![
                "questions:linear-algebra:easy",
                "questions:linear-algebra:medium",
                "explanations:linear-algebra",
                "explanations:eigenvalues",
                "explanations:matrix-rank",
            ]
        );
    }

    #[test]
    fn test_predict_keys_hard_and_dedup() {
        let context =
            UsageContext::new("optics", Difficulty::Hard).with_activity("Optics");

        assert_eq!(
            context.predict_keys(),
            vec!["questions:optics:hard", "explanations:optics"]
        );
    }

    #[test]
    fn test_predict_keys_empty_topic() {
        let context = UsageContext::new("   ", Difficulty::Medium);
        assert!(context.predict_keys().is_empty());
    }

    #[test]
    fn test_usage_context_deserialize_defaults() {
        let context: UsageContext =
            serde_json::from_str(r#"{"current_topic":"genetics"}"#).unwrap();
        assert_eq!(context.difficulty, Difficulty::Medium);
        assert!(context.recent_activity.is_empty());
    }

    #[tokio::test]
    async fn test_warm_loads_at_high_priority() {
        let store = shared_store();
        let source = Arc::new(StaticSource::with_values([
            ("config:app", json!({"theme": "dark"})),
            ("catalog", json!(["a", "b"])),
        ]));
        let warmer = PredictiveWarmer::new(store.clone(), source, Duration::from_millis(10));

        let keys = vec![
            "config:app".to_string(),
            "catalog".to_string(),
            "missing".to_string(),
        ];
        assert_eq!(warmer.warm(&keys).await, 2);

        let guard = store.read().await;
        assert_eq!(guard.peek("config:app").unwrap().priority, Priority::High);
        assert!(guard.peek("missing").is_none());
    }

    #[tokio::test]
    async fn test_predictive_cache_is_staggered_and_low_priority() {
        let store = shared_store();
        let source = Arc::new(StaticSource::with_values([
            ("questions:optics:hard", json!({"count": 10})),
            ("explanations:optics", json!("light bends")),
        ]));
        let warmer =
            PredictiveWarmer::new(store.clone(), source.clone(), Duration::from_millis(200));

        let scheduled = warmer
            .predictive_cache(&UsageContext::new("optics", Difficulty::Hard))
            .await;
        assert_eq!(scheduled.len(), 2);

        // Returned before any work ran
        assert!(store.read().await.is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.read().await.contains("questions:optics:hard"));
        assert!(!store.read().await.contains("explanations:optics"));

        tokio::time::sleep(Duration::from_millis(250)).await;
        let guard = store.read().await;
        assert_eq!(
            guard.peek("explanations:optics").unwrap().priority,
            Priority::Low
        );
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_predictive_cache_skips_cached_keys() {
        let store = shared_store();
        store
            .write()
            .await
            .set("explanations:optics", &json!("cached"), SetOptions::new())
            .unwrap();

        let source = Arc::new(StaticSource::with_values([(
            "explanations:optics",
            json!("fresh"),
        )]));
        let warmer = PredictiveWarmer::new(store.clone(), source.clone(), Duration::from_millis(1));

        let scheduled = warmer
            .predictive_cache(&UsageContext::new("optics", Difficulty::Hard))
            .await;
        assert_eq!(scheduled, vec!["questions:optics:hard".to_string()]);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(source.fetch_count(), 1);

        let cached: Option<Value> = store.write().await.get("explanations:optics");
        assert_eq!(cached, Some(json!("cached")));
    }

    #[tokio::test]
    async fn test_cancel_pending() {
        let store = shared_store();
        let source = Arc::new(StaticSource::with_values([(
            "explanations:optics",
            json!("x"),
        )]));
        let warmer = PredictiveWarmer::new(store.clone(), source.clone(), Duration::from_secs(60));

        warmer
            .predictive_cache(&UsageContext::new("optics", Difficulty::Hard))
            .await;
        warmer.cancel_pending();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(warmer.pending_count(), 0);
        // The first key (no delay) may have run, the second never does
        assert!(!store.read().await.contains("explanations:optics"));
    }

    /// Answers every key with the same value after a delay.
    struct SlowSource {
        delay: Duration,
        value: Value,
    }

    #[async_trait]
    impl DataSource for SlowSource {
        async fn fetch(&self, _key: &str) -> anyhow::Result<Option<Value>> {
            tokio::time::sleep(self.delay).await;
            Ok(Some(self.value.clone()))
        }
    }

    #[tokio::test]
    async fn test_predictive_load_keeps_concurrent_foreground_write() {
        let store = shared_store();
        let backend = Arc::new(MemoryBackend::new());
        let (mirror, writer) = spawn_persistence_writer(backend.clone());
        store.write().await.attach_mirror(mirror);

        let source = Arc::new(SlowSource {
            delay: Duration::from_millis(200),
            value: json!("stale from source"),
        });
        let warmer = PredictiveWarmer::new(store.clone(), source, Duration::from_millis(500));

        let scheduled = warmer
            .predictive_cache(&UsageContext::new("optics", Difficulty::Hard))
            .await;
        assert_eq!(scheduled[0], "questions:optics:hard");

        // Lands while the first fetch is in flight
        tokio::time::sleep(Duration::from_millis(50)).await;
        store
            .write()
            .await
            .set(
                "questions:optics:hard",
                &"fresh foreground",
                SetOptions::new().priority(Priority::Critical),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        warmer.cancel_pending();

        {
            let mut guard = store.write().await;
            assert_eq!(
                guard.peek("questions:optics:hard").unwrap().priority,
                Priority::Critical
            );
            assert_eq!(
                guard.get::<String>("questions:optics:hard"),
                Some("fresh foreground".to_string())
            );
            drop(guard.detach_mirror());
        }
        writer.await.unwrap();

        assert!(backend.contains("questions:optics:hard"));
    }

    #[tokio::test]
    async fn test_predictive_load_never_evicts() {
        let store = shared_store_with_budget(200);
        store
            .write()
            .await
            .set(
                "hot",
                &"h".repeat(140),
                SetOptions::new().priority(Priority::Critical),
            )
            .unwrap();

        let source = Arc::new(StaticSource::with_values([(
            "questions:optics:hard",
            json!("q".repeat(90)),
        )]));
        let warmer = PredictiveWarmer::new(store.clone(), source.clone(), Duration::from_secs(60));

        warmer
            .predictive_cache(&UsageContext::new("optics", Difficulty::Hard))
            .await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        warmer.cancel_pending();

        let guard = store.read().await;
        assert_eq!(source.fetch_count(), 1);
        assert!(guard.contains("hot"));
        assert!(!guard.contains("questions:optics:hard"));
        assert_eq!(guard.stats().eviction_count, 0);
    }
}
