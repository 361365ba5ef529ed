//! Entry Store Module
//!
//! Main cache engine: owns the key-to-entry map and wires the codec, eviction
//! policy, stats tracker and persistence mirror together.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{
    current_timestamp_ms, estimate_size, CacheEntry, CacheStats, CompressionCodec,
    EncodedPayload, EvictionPolicy, PersistedRecord, PersistenceHandle, Priority, StatsTracker,
};
use crate::config::Config;
use crate::error::Result;

// == Set Options ==
/// Per-write overrides. Unset fields fall back to the store defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SetOptions {
    pub ttl: Option<Duration>,
    pub priority: Option<Priority>,
    /// `Some(true)` forces a compression attempt, `Some(false)` disables it,
    /// `None` compresses above the size threshold.
    pub compress: Option<bool>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = Some(compress);
        self
    }
}

enum Lookup<T> {
    Hit(T),
    Absent,
    Expired,
    Undecodable(crate::error::CodecError),
}

// == Entry Store ==
/// Size-bounded cache storage with TTL expiry and score-based eviction.
#[derive(Debug)]
pub struct EntryStore {
    entries: HashMap<String, CacheEntry>,
    /// Sum of `size_bytes` over all entries
    current_size: usize,
    stats: StatsTracker,
    policy: EvictionPolicy,
    codec: CompressionCodec,
    default_ttl: Duration,
    /// Write-behind mirror, None when persistence is disabled
    mirror: Option<PersistenceHandle>,
}

impl EntryStore {
    // == Constructor ==
    /// Creates a store from its parts.
    pub fn new(
        policy: EvictionPolicy,
        codec: CompressionCodec,
        default_ttl: Duration,
        latency_samples: usize,
    ) -> Self {
        Self {
            entries: HashMap::new(),
            current_size: 0,
            stats: StatsTracker::new(latency_samples),
            policy,
            codec,
            default_ttl,
            mirror: None,
        }
    }

    /// Creates a store using the budget, codec and TTL settings in `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            EvictionPolicy::new(config.max_size_bytes, config.eviction_margin),
            CompressionCodec::new(config.compression_threshold, config.compression_enabled),
            config.default_ttl_duration(),
            config.latency_samples,
        )
    }

    pub fn attach_mirror(&mut self, mirror: PersistenceHandle) {
        self.mirror = Some(mirror);
    }

    /// Detaches the mirror so the persistence writer can drain and stop.
    pub fn detach_mirror(&mut self) -> Option<PersistenceHandle> {
        self.mirror.take()
    }

    // == Set ==
    /// Stores or fully replaces the entry for `key`.
    ///
    /// Fails with `EntryTooLarge` (leaving the store untouched) when the
    /// encoded entry alone exceeds the budget.
    pub fn set<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
        options: SetOptions,
    ) -> Result<()> {
        let start = Instant::now();

        let encoded = self.codec.encode(value, options.compress)?;
        let size = estimate_size(key, encoded.bytes.len());
        self.policy.check_fits(key, size)?;

        // Full replace: the old entry's metadata is not carried over
        let replaced = self.remove_entry(key);
        self.ensure_capacity(size);

        let replaced_persistent = replaced.map_or(false, |old| old.priority.is_persistent());
        self.insert_encoded(key, encoded, options, replaced_persistent);
        self.stats.record_write(start.elapsed());

        Ok(())
    }

    // == Insert If Absent ==
    /// Stores `key` only when it has no live entry and the encoded value fits
    /// in the free budget. Never replaces and never evicts.
    ///
    /// Returns `Ok(false)` when the key was skipped.
    pub fn insert_if_absent<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
        options: SetOptions,
    ) -> Result<bool> {
        let start = Instant::now();

        if self.contains(key) {
            return Ok(false);
        }

        let encoded = self.codec.encode(value, options.compress)?;
        let size = estimate_size(key, encoded.bytes.len());

        // An expired leftover is dead either way
        if self.entries.contains_key(key) {
            self.discard(key);
        }

        if self.current_size + size > self.policy.max_size_bytes() {
            debug!(
                "Skipping '{}': {} bytes do not fit in {} free bytes",
                key,
                size,
                self.policy.max_size_bytes().saturating_sub(self.current_size)
            );
            return Ok(false);
        }

        self.insert_encoded(key, encoded, options, false);
        self.stats.record_write(start.elapsed());

        Ok(true)
    }

    // == Get ==
    /// Returns the live value for `key`, or None.
    ///
    /// Absence, expiry and undecodable payloads all look the same to the
    /// caller; the latter two also remove the entry.
    pub fn get<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        let start = Instant::now();
        let now = current_timestamp_ms();

        let lookup = match self.entries.get_mut(key) {
            None => Lookup::Absent,
            Some(entry) if entry.is_expired_at(now) => Lookup::Expired,
            Some(entry) => match self.codec.decode::<T>(&entry.payload, entry.is_compressed()) {
                Ok(value) => {
                    entry.record_access(now);
                    Lookup::Hit(value)
                }
                Err(e) => Lookup::Undecodable(e),
            },
        };

        match lookup {
            Lookup::Hit(value) => {
                self.stats.record_hit(start.elapsed());
                Some(value)
            }
            Lookup::Absent => {
                self.stats.record_miss(start.elapsed());
                None
            }
            Lookup::Expired => {
                debug!("Entry '{}' expired on access", key);
                self.discard(key);
                self.stats.record_miss(start.elapsed());
                None
            }
            Lookup::Undecodable(e) => {
                warn!("Dropping undecodable entry '{}': {}", key, e);
                self.discard(key);
                self.stats.record_miss(start.elapsed());
                None
            }
        }
    }

    // == Contains ==
    /// Live-entry check that does not touch stats or access metadata.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map_or(false, |entry| !entry.is_expired())
    }

    /// Read-only view of an entry, expired or not.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    // == Delete ==
    /// Removes `key` and its persisted mirror. Returns whether it was present.
    pub fn delete(&mut self, key: &str) -> bool {
        let existed = self.remove_entry(key).is_some();
        if let Some(mirror) = &self.mirror {
            mirror.remove(key);
        }
        existed
    }

    // == Clear ==
    /// Removes every entry and every persisted mirror.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.current_size = 0;
        if let Some(mirror) = &self.mirror {
            mirror.clear();
        }
    }

    // == Ensure Capacity ==
    /// Evicts the lowest scoring entries until `incoming_size` more bytes fit.
    ///
    /// Returns the number of evicted entries.
    pub fn ensure_capacity(&mut self, incoming_size: usize) -> usize {
        let victims = self.policy.select_victims(
            &self.entries,
            self.current_size,
            incoming_size,
            current_timestamp_ms(),
        );

        if victims.is_empty() {
            return 0;
        }

        for key in &victims {
            self.discard(key);
            self.stats.record_eviction();
        }

        info!(
            "Evicted {} entries, {} of {} bytes in use",
            victims.len(),
            self.current_size,
            self.policy.max_size_bytes()
        );
        victims.len()
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = current_timestamp_ms();
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.discard(key);
        }

        expired_keys.len()
    }

    // == Restore ==
    /// Re-inserts a record loaded from durable storage without mirroring it
    /// again. Returns false if the record is expired or cannot fit.
    pub fn restore(&mut self, record: PersistedRecord) -> bool {
        if record.is_expired_at(current_timestamp_ms()) {
            return false;
        }

        let (key, entry) = record.into_entry();
        if self.policy.check_fits(&key, entry.size_bytes).is_err() {
            return false;
        }

        self.remove_entry(&key);
        self.ensure_capacity(entry.size_bytes);
        self.current_size += entry.size_bytes;
        self.entries.insert(key, entry);
        true
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.entries.len(), self.current_size)
    }

    // == Length ==
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Estimated bytes currently held.
    pub fn total_size(&self) -> usize {
        self.current_size
    }

    pub fn max_size_bytes(&self) -> usize {
        self.policy.max_size_bytes()
    }

    /// Builds the entry, mirrors it and adds it to the map. The caller has
    /// already made room and removed any previous entry for `key`.
    fn insert_encoded(
        &mut self,
        key: &str,
        encoded: EncodedPayload,
        options: SetOptions,
        replaced_persistent: bool,
    ) {
        let ttl = options.ttl.unwrap_or(self.default_ttl);
        let priority = options.priority.unwrap_or_default();
        let entry = CacheEntry::new(key, encoded.bytes, encoded.compressed, ttl, priority);

        if let Some(mirror) = &self.mirror {
            if priority.is_persistent() {
                mirror.persist(PersistedRecord::from_entry(key, &entry));
            } else if replaced_persistent {
                mirror.remove(key);
            }
        }

        self.current_size += entry.size_bytes;
        self.entries.insert(key.to_string(), entry);
    }

    /// Removes from the map only, keeping `current_size` in step.
    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let removed = self.entries.remove(key)?;
        self.current_size = self.current_size.saturating_sub(removed.size_bytes);
        Some(removed)
    }

    /// Removes from the map and from the persisted mirror.
    fn discard(&mut self, key: &str) {
        if let Some(removed) = self.remove_entry(key) {
            if removed.priority.is_persistent() {
                if let Some(mirror) = &self.mirror {
                    mirror.remove(key);
                }
            }
        }
    }
}
