//! Eviction Policy Module
//!
//! Keeps the estimated cache size within a byte budget by scoring entries on
//! age, idle time, access frequency and priority.

use std::cmp::Ordering;

use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};

// == Eviction Policy ==
/// Capacity budget plus the scoring rule used to pick victims.
#[derive(Debug, Clone)]
pub struct EvictionPolicy {
    max_size_bytes: usize,
    margin_ratio: f64,
}

impl EvictionPolicy {
    // == Constructor ==
    /// Creates a policy for `max_size_bytes`, freeing an extra
    /// `margin_ratio * max_size_bytes` whenever eviction kicks in.
    pub fn new(max_size_bytes: usize, margin_ratio: f64) -> Self {
        Self {
            max_size_bytes,
            margin_ratio: margin_ratio.clamp(0.0, 1.0),
        }
    }

    pub fn max_size_bytes(&self) -> usize {
        self.max_size_bytes
    }

    /// Extra bytes reclaimed beyond the strict overflow.
    pub fn margin_bytes(&self) -> usize {
        (self.max_size_bytes as f64 * self.margin_ratio) as usize
    }

    // == Retention Score ==
    /// Lower score = evict first.
    ///
    /// `weight * (access_count + 1) / (age + 2 * idle + 1)`, all times in
    /// milliseconds. Old, idle, rarely read, low-priority entries score lowest.
    pub fn score(entry: &CacheEntry, now: u64) -> f64 {
        let age = now.saturating_sub(entry.created_at) as f64;
        let idle = now.saturating_sub(entry.last_accessed_at) as f64;
        let staleness = age + 2.0 * idle + 1.0;

        entry.priority.weight() * (entry.access_count as f64 + 1.0) / staleness
    }

    // == Admission Check ==
    /// Rejects an entry that could never fit, even into an empty cache.
    pub fn check_fits(&self, key: &str, size: usize) -> Result<()> {
        if size > self.max_size_bytes {
            return Err(CacheError::EntryTooLarge {
                key: key.to_string(),
                size,
                budget: self.max_size_bytes,
            });
        }
        Ok(())
    }

    // == Select Victims ==
    /// Picks the keys to evict so that `incoming_size` fits.
    ///
    /// Returns an empty list when no eviction is needed. Otherwise victims are
    /// taken in ascending score order until the overflow plus the margin has
    /// been reclaimed, capped at everything currently stored.
    pub fn select_victims<'a, I>(
        &self,
        entries: I,
        current_size: usize,
        incoming_size: usize,
        now: u64,
    ) -> Vec<String>
    where
        I: IntoIterator<Item = (&'a String, &'a CacheEntry)>,
    {
        let projected = current_size + incoming_size;
        if projected <= self.max_size_bytes {
            return Vec::new();
        }

        let overflow = projected - self.max_size_bytes;
        let target = (overflow + self.margin_bytes()).min(current_size);

        let mut candidates: Vec<(f64, u64, &String, usize)> = entries
            .into_iter()
            .map(|(key, entry)| (Self::score(entry, now), entry.created_at, key, entry.size_bytes))
            .collect();

        // Ties fall back to the older entry, then to key order
        candidates.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(b.2))
        });

        let mut freed = 0usize;
        let mut victims = Vec::new();
        for (_, _, key, size) in candidates {
            if freed >= target {
                break;
            }
            freed += size;
            victims.push(key.clone());
        }

        victims
    }
}
