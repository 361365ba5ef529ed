//! Persistence Layer
//!
//! Write-behind mirror of non-low-priority entries. The in-memory store stays
//! authoritative; the mirror is read once at startup and otherwise only
//! written to by a single background task.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, Priority};
use crate::error::PersistenceError;

type PersistResult<T> = std::result::Result<T, PersistenceError>;

const RECORD_EXTENSION: &str = "json";

/// Common file name limit (ext4, APFS, NTFS).
const MAX_FILE_NAME_LEN: usize = 255;

/// Encoded key characters kept in front of the hash in long file names.
const HASHED_NAME_PREFIX_LEN: usize = 64;

// == Persisted Record ==
/// Durable form of a single entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub key: String,
    /// Stored payload bytes, compressed when `compressed_size` is set
    pub payload: Vec<u8>,
    /// Unix milliseconds
    pub created_at: u64,
    pub ttl_ms: u64,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed_size: Option<usize>,
}

impl PersistedRecord {
    pub fn from_entry(key: &str, entry: &CacheEntry) -> Self {
        Self {
            key: key.to_string(),
            payload: entry.payload.to_vec(),
            created_at: entry.created_at,
            ttl_ms: entry.ttl_ms,
            priority: entry.priority,
            compressed_size: entry.compressed_size,
        }
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        now.saturating_sub(self.created_at) >= self.ttl_ms
    }

    /// Structural checks beyond what deserialization enforces.
    pub fn is_valid(&self) -> bool {
        !self.key.is_empty()
            && !self.payload.is_empty()
            && self
                .compressed_size
                .map_or(true, |size| size == self.payload.len())
    }

    /// Rebuilds the live entry. Access metadata starts fresh.
    pub fn into_entry(self) -> (String, CacheEntry) {
        let entry = CacheEntry::with_created_at(
            &self.key,
            self.payload.into(),
            self.compressed_size.is_some(),
            Duration::from_millis(self.ttl_ms),
            self.priority,
            self.created_at,
        );
        (self.key, entry)
    }
}

// == Backend Trait ==
/// Keyed durable storage for persisted records.
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Writes or replaces the record for `record.key`
    async fn persist(&self, record: &PersistedRecord) -> PersistResult<()>;

    /// Removes the record for `key`, succeeding if it does not exist
    async fn remove(&self, key: &str) -> PersistResult<()>;

    /// Removes every record
    async fn clear(&self) -> PersistResult<()>;

    /// Loads every readable record. Unreadable records are discarded
    /// individually rather than failing the whole load.
    async fn load_all(&self) -> PersistResult<Vec<PersistedRecord>>;
}

// == File Backend ==
/// One JSON file per key inside a directory. File names are the
/// percent-encoded key.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Opens (creating if needed) the persistence directory.
    pub async fn open(dir: impl AsRef<Path>) -> PersistResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(record_file_name(key))
    }

    async fn read_record(path: &Path) -> PersistResult<PersistedRecord> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl PersistenceBackend for FileBackend {
    async fn persist(&self, record: &PersistedRecord) -> PersistResult<()> {
        let path = self.path_for(&record.key);
        let tmp = path.with_extension("tmp");
        let bytes = serde_json::to_vec(record)?;

        // Write then rename so a crash never leaves a half-written record
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> PersistResult<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> PersistResult<()> {
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            let is_record = path
                .extension()
                .map_or(false, |ext| ext == RECORD_EXTENSION || ext == "tmp");
            if is_record {
                tokio::fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }

    async fn load_all(&self) -> PersistResult<Vec<PersistedRecord>> {
        let mut records = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;

        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().map_or(true, |ext| ext != RECORD_EXTENSION) {
                continue;
            }

            match Self::read_record(&path).await {
                Ok(record) if record.is_valid() => records.push(record),
                Ok(_) => {
                    warn!("Discarding invalid persisted record {}", path.display());
                    let _ = tokio::fs::remove_file(&path).await;
                }
                Err(e) => {
                    warn!("Discarding unreadable persisted record {}: {}", path.display(), e);
                    let _ = tokio::fs::remove_file(&path).await;
                }
            }
        }

        Ok(records)
    }
}

/// Percent-encoded key plus extension. Keys whose encoding would exceed the
/// file name limit get an encoded prefix and the key's SHA-256 instead.
///
/// `+` is always percent-encoded, so hashed names cannot collide with
/// plain ones. The real key is read from the record body on load.
fn record_file_name(key: &str) -> String {
    let encoded = urlencoding::encode(key);
    if encoded.len() + 1 + RECORD_EXTENSION.len() <= MAX_FILE_NAME_LEN {
        return format!("{}.{}", encoded, RECORD_EXTENSION);
    }

    // Percent-encoding output is ASCII, so any byte index is a char boundary
    let prefix = &encoded[..HASHED_NAME_PREFIX_LEN];
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{}+{:x}.{}", prefix, hasher.finalize(), RECORD_EXTENSION)
}

// == Memory Backend ==
/// In-process backend. Survives a `CacheManager` restart as long as the
/// same `Arc` is handed to the new manager.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<String, PersistedRecord>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.lock().contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<PersistedRecord> {
        self.records.lock().get(key).cloned()
    }

    /// Stores a record directly, bypassing the cache.
    pub fn insert(&self, record: PersistedRecord) {
        self.records.lock().insert(record.key.clone(), record);
    }
}

#[async_trait]
impl PersistenceBackend for MemoryBackend {
    async fn persist(&self, record: &PersistedRecord) -> PersistResult<()> {
        self.insert(record.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> PersistResult<()> {
        self.records.lock().remove(key);
        Ok(())
    }

    async fn clear(&self) -> PersistResult<()> {
        self.records.lock().clear();
        Ok(())
    }

    async fn load_all(&self) -> PersistResult<Vec<PersistedRecord>> {
        let mut records = self.records.lock();
        records.retain(|_, record| record.is_valid());
        Ok(records.values().cloned().collect())
    }
}

// == Mirror Operations ==
#[derive(Debug)]
enum MirrorOp {
    Persist(PersistedRecord),
    Remove(String),
    Clear,
}

// == Persistence Handle ==
/// Fire-and-forget sender used by the store. Never blocks and never fails
/// from the caller's point of view.
#[derive(Debug, Clone)]
pub struct PersistenceHandle {
    tx: mpsc::UnboundedSender<MirrorOp>,
}

impl PersistenceHandle {
    pub fn persist(&self, record: PersistedRecord) {
        self.send(MirrorOp::Persist(record));
    }

    pub fn remove(&self, key: &str) {
        self.send(MirrorOp::Remove(key.to_string()));
    }

    pub fn clear(&self) {
        self.send(MirrorOp::Clear);
    }

    fn send(&self, op: MirrorOp) {
        if let Err(e) = self.tx.send(op) {
            debug!("Persistence writer stopped, dropping {:?}", e.0);
        }
    }
}

/// Spawns the background writer applying mirror operations in order.
///
/// The task ends once every `PersistenceHandle` clone has been dropped, after
/// draining queued operations.
pub fn spawn_persistence_writer(
    backend: Arc<dyn PersistenceBackend>,
) -> (PersistenceHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        debug!("Persistence writer started");
        let mut applied = 0u64;

        while let Some(op) = rx.recv().await {
            let result = match &op {
                MirrorOp::Persist(record) => backend.persist(record).await,
                MirrorOp::Remove(key) => backend.remove(key).await,
                MirrorOp::Clear => backend.clear().await,
            };

            match result {
                Ok(()) => applied += 1,
                Err(e) => warn!("Persistence operation failed ({}): {}", op_name(&op), e),
            }
        }

        info!("Persistence writer stopped after {} operations", applied);
    });

    (PersistenceHandle { tx }, handle)
}

fn op_name(op: &MirrorOp) -> String {
    match op {
        MirrorOp::Persist(record) => format!("persist {}", record.key),
        MirrorOp::Remove(key) => format!("remove {}", key),
        MirrorOp::Clear => "clear".to_string(),
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MAX_KEY_LENGTH;

    fn record(key: &str, created_at: u64, ttl_ms: u64, priority: Priority) -> PersistedRecord {
        PersistedRecord {
            key: key.to_string(),
            payload: b"{\"score\":91}".to_vec(),
            created_at,
            ttl_ms,
            priority,
            compressed_size: None,
        }
    }

    #[test]
    fn test_record_expiry() {
        let rec = record("k", 1_000, 500, Priority::High);
        assert!(!rec.is_expired_at(1_499));
        assert!(rec.is_expired_at(1_500));
    }

    #[test]
    fn test_record_validity() {
        assert!(record("k", 0, 1, Priority::High).is_valid());
        assert!(!record("", 0, 1, Priority::High).is_valid());

        let mut mismatched = record("k", 0, 1, Priority::High);
        mismatched.compressed_size = Some(3);
        assert!(!mismatched.is_valid());
    }

    #[test]
    fn test_record_entry_conversion() {
        let rec = record("progress:42", 1_000, 60_000, Priority::Critical);
        let (key, entry) = rec.clone().into_entry();

        assert_eq!(key, "progress:42");
        assert_eq!(entry.created_at, 1_000);
        assert_eq!(entry.ttl_ms, 60_000);
        assert_eq!(entry.priority, Priority::Critical);
        assert_eq!(entry.access_count, 0);
        assert!(!entry.is_compressed());

        assert_eq!(PersistedRecord::from_entry(&key, &entry), rec);
    }

    #[test]
    fn test_record_json_omits_absent_compressed_size() {
        let json = serde_json::to_string(&record("k", 0, 1, Priority::Medium)).unwrap();
        assert!(!json.contains("compressed_size"));
        assert!(json.contains("\"priority\":\"medium\""));
    }

    #[tokio::test]
    async fn test_file_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();

        backend.persist(&record("user/1 progress", 5, 10, Priority::High)).await.unwrap();
        backend.persist(&record("b", 5, 10, Priority::Medium)).await.unwrap();

        let mut loaded = backend.load_all().await.unwrap();
        loaded.sort_by(|a, b| a.key.cmp(&b.key));
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].key, "user/1 progress");

        backend.remove("b").await.unwrap();
        backend.remove("missing").await.unwrap();
        assert_eq!(backend.load_all().await.unwrap().len(), 1);

        backend.clear().await.unwrap();
        assert!(backend.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_backend_discards_corrupt_records() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();

        backend.persist(&record("good", 5, 10, Priority::High)).await.unwrap();
        let corrupt = dir.path().join("bad.json");
        tokio::fs::write(&corrupt, b"{ not json").await.unwrap();

        let loaded = backend.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].key, "good");
        assert!(!corrupt.exists(), "corrupt record should be removed");
    }

    #[tokio::test]
    async fn test_memory_backend_operations() {
        let backend = MemoryBackend::new();
        backend.persist(&record("a", 0, 1, Priority::High)).await.unwrap();
        assert!(backend.contains("a"));

        backend.remove("a").await.unwrap();
        assert!(backend.is_empty());

        backend.insert(record("", 0, 1, Priority::High));
        assert!(backend.load_all().await.unwrap().is_empty());
        assert!(backend.is_empty(), "invalid records are dropped on load");
    }

    #[tokio::test]
    async fn test_writer_applies_ops_in_order() {
        let backend = Arc::new(MemoryBackend::new());
        let (handle, task) = spawn_persistence_writer(backend.clone());

        handle.persist(record("a", 0, 1, Priority::High));
        handle.persist(record("b", 0, 1, Priority::High));
        handle.remove("a");
        handle.clear();
        handle.persist(record("c", 0, 1, Priority::High));

        drop(handle);
        task.await.unwrap();

        assert_eq!(backend.len(), 1);
        assert!(backend.contains("c"));
    }

    #[test]
    fn test_record_file_name_is_bounded() {
        assert_eq!(record_file_name("user/1"), "user%2F1.json");

        let longest = "k".repeat(MAX_KEY_LENGTH);
        let name = record_file_name(&longest);
        assert!(name.len() <= MAX_FILE_NAME_LEN);
        assert!(name.starts_with(&"k".repeat(HASHED_NAME_PREFIX_LEN)));

        let wide = "é".repeat(MAX_KEY_LENGTH / 2);
        assert!(record_file_name(&wide).len() <= MAX_FILE_NAME_LEN);

        let mut other = longest.clone();
        other.replace_range(200..201, "j");
        assert_ne!(record_file_name(&other), name);
    }

    #[tokio::test]
    async fn test_file_backend_persists_longest_keys() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();

        let ascii = "k".repeat(MAX_KEY_LENGTH);
        let wide = "é".repeat(MAX_KEY_LENGTH / 2);
        backend.persist(&record(&ascii, 5, 10, Priority::Critical)).await.unwrap();
        backend.persist(&record(&wide, 5, 10, Priority::High)).await.unwrap();

        let mut keys: Vec<String> = backend
            .load_all()
            .await
            .unwrap()
            .into_iter()
            .map(|rec| rec.key)
            .collect();
        keys.sort();
        assert_eq!(keys, vec![ascii.clone(), wide.clone()]);

        backend.remove(&ascii).await.unwrap();
        backend.remove(&wide).await.unwrap();
        assert!(backend.load_all().await.unwrap().is_empty());
    }
}
