//! Cache Statistics Module
//!
//! Tracks hits, misses, writes, evictions and recent access latencies.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;

// == Stats Tracker ==
/// Running counters owned by the entry store.
#[derive(Debug, Clone)]
pub struct StatsTracker {
    hits: u64,
    misses: u64,
    writes: u64,
    evictions: u64,
    /// Most recent access latencies in milliseconds
    latencies: VecDeque<f64>,
    max_samples: usize,
}

impl StatsTracker {
    // == Constructor ==
    /// Creates a tracker keeping at most `max_samples` latency samples.
    pub fn new(max_samples: usize) -> Self {
        Self {
            hits: 0,
            misses: 0,
            writes: 0,
            evictions: 0,
            latencies: VecDeque::with_capacity(max_samples.min(4096)),
            max_samples,
        }
    }

    pub fn record_hit(&mut self, elapsed: Duration) {
        self.hits += 1;
        self.record_latency(elapsed);
    }

    pub fn record_miss(&mut self, elapsed: Duration) {
        self.misses += 1;
        self.record_latency(elapsed);
    }

    pub fn record_write(&mut self, elapsed: Duration) {
        self.writes += 1;
        self.record_latency(elapsed);
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    fn record_latency(&mut self, elapsed: Duration) {
        if self.max_samples == 0 {
            return;
        }
        if self.latencies.len() == self.max_samples {
            self.latencies.pop_front();
        }
        self.latencies.push_back(elapsed.as_secs_f64() * 1000.0);
    }

    pub fn sample_count(&self) -> usize {
        self.latencies.len()
    }

    // == Snapshot ==
    /// Derives a point-in-time view. Rates and averages are computed here,
    /// never stored.
    pub fn snapshot(&self, total_entries: usize, total_size_bytes: usize) -> CacheStats {
        let requests = self.hits + self.misses;
        let (hit_rate, miss_rate) = if requests == 0 {
            (0.0, 0.0)
        } else {
            let hit_rate = self.hits as f64 / requests as f64 * 100.0;
            (hit_rate, 100.0 - hit_rate)
        };

        let avg_access_time_ms = if self.latencies.is_empty() {
            0.0
        } else {
            self.latencies.iter().sum::<f64>() / self.latencies.len() as f64
        };

        CacheStats {
            hit_count: self.hits,
            miss_count: self.misses,
            write_count: self.writes,
            eviction_count: self.evictions,
            hit_rate,
            miss_rate,
            total_entries,
            total_size_bytes,
            avg_access_time_ms,
        }
    }
}

// == Cache Stats ==
/// Point-in-time cache statistics. Rates are percentages.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hit_count: u64,
    pub miss_count: u64,
    pub write_count: u64,
    pub eviction_count: u64,
    pub hit_rate: f64,
    pub miss_rate: f64,
    pub total_entries: usize,
    pub total_size_bytes: usize,
    pub avg_access_time_ms: f64,
}
