//! Data Sources
//!
//! Producers of expensive data consulted by warming, prefetching and
//! predictive caching. The cache itself never calls a source on `get`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde_json::Value;

/// Something that can produce the value for a cache key.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Returns `Ok(None)` when the key has no value upstream.
    async fn fetch(&self, key: &str) -> anyhow::Result<Option<Value>>;
}

// == Noop Source ==
/// Source that never has data. Used when no upstream is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSource;

#[async_trait]
impl DataSource for NoopSource {
    async fn fetch(&self, _key: &str) -> anyhow::Result<Option<Value>> {
        Ok(None)
    }
}

// == Static Source ==
/// Serves values from a fixed map and counts fetches.
#[derive(Debug, Default)]
pub struct StaticSource {
    values: RwLock<HashMap<String, Value>>,
    fetches: AtomicUsize,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let source = Self::new();
        for (key, value) in values {
            source.insert(key, value);
        }
        source
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.values.write().insert(key.into(), value);
    }

    /// Number of `fetch` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DataSource for StaticSource {
    async fn fetch(&self, key: &str) -> anyhow::Result<Option<Value>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self.values.read().get(key).cloned())
    }
}

// == HTTP Source ==
/// Fetches `GET {base_url}/{key}` and expects a JSON body. A 404 means the
/// key has no value.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(key))
    }
}

#[async_trait]
impl DataSource for HttpSource {
    async fn fetch(&self, key: &str) -> anyhow::Result<Option<Value>> {
        let response = self.client.get(self.url_for(key)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let value = response.error_for_status()?.json::<Value>().await?;
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_noop_source() {
        let fetched = tokio_test::block_on(NoopSource.fetch("anything"));
        assert!(tokio_test::assert_ok!(fetched).is_none());
    }

    #[tokio::test]
    async fn test_static_source_counts_fetches() {
        let source = StaticSource::with_values([("questions:algebra", json!([1, 2, 3]))]);

        assert_eq!(
            source.fetch("questions:algebra").await.unwrap(),
            Some(json!([1, 2, 3]))
        );
        assert!(source.fetch("missing").await.unwrap().is_none());
        assert_eq!(source.fetch_count(), 2);
    }

    #[test]
    fn test_http_source_url() {
        let source = HttpSource::new("http://localhost:8080/api/").unwrap();
        assert_eq!(
            source.url_for("questions:linear algebra"),
            "http://localhost:8080/api/questions%3Alinear%20algebra"
        );
    }
}
