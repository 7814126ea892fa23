use octastore_common::ConsistencyLevel;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Number of recent query latencies kept for the rolling average.
pub(crate) const LATENCY_WINDOW: usize = 1000;

/// Fixed-capacity ring of the most recent latency samples.
#[derive(Debug)]
pub struct LatencyWindow {
    samples: Vec<Duration>,
    capacity: usize,
    index: usize,
    filled: bool,
}

impl LatencyWindow {
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be positive");
        Self {
            samples: vec![Duration::ZERO; capacity],
            capacity,
            index: 0,
            filled: false,
        }
    }

    pub fn record(&mut self, latency: Duration) {
        self.samples[self.index] = latency;
        self.index = (self.index + 1) % self.capacity;
        if self.index == 0 {
            self.filled = true;
        }
    }

    pub fn count(&self) -> usize {
        if self.filled {
            self.capacity
        } else {
            self.index
        }
    }

    pub fn average(&self) -> Duration {
        let count = self.count();
        if count == 0 {
            return Duration::ZERO;
        }
        let total: Duration = self.samples[..count].iter().sum();
        total / count as u32
    }

    pub fn max(&self) -> Duration {
        self.samples[..self.count()]
            .iter()
            .copied()
            .max()
            .unwrap_or(Duration::ZERO)
    }
}

/// Live counters owned by one engine instance.
#[derive(Debug)]
pub(crate) struct StatsRecorder {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    total_queries: AtomicU64,
    total_writes: AtomicU64,
    consistency: [AtomicU64; 3],
    latencies: Mutex<LatencyWindow>,
}

impl StatsRecorder {
    pub(crate) fn new() -> Self {
        Self {
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            total_queries: AtomicU64::new(0),
            total_writes: AtomicU64::new(0),
            consistency: Default::default(),
            latencies: Mutex::new(LatencyWindow::new(LATENCY_WINDOW)),
        }
    }

    pub(crate) fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_query(&self) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.total_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_consistency(&self, level: ConsistencyLevel) {
        let slot = match level {
            ConsistencyLevel::One => 0,
            ConsistencyLevel::Quorum => 1,
            ConsistencyLevel::All => 2,
        };
        self.consistency[slot].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_latency(&self, latency: Duration) {
        self.latencies.lock().record(latency);
    }

    pub(crate) fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub(crate) fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub(crate) fn total_queries(&self) -> u64 {
        self.total_queries.load(Ordering::Relaxed)
    }

    pub(crate) fn total_writes(&self) -> u64 {
        self.total_writes.load(Ordering::Relaxed)
    }

    pub(crate) fn average_latency(&self) -> Duration {
        self.latencies.lock().average()
    }

    pub(crate) fn max_latency(&self) -> Duration {
        self.latencies.lock().max()
    }

    pub(crate) fn consistency_requests(&self) -> BTreeMap<ConsistencyLevel, u64> {
        ConsistencyLevel::ALL_LEVELS
            .into_iter()
            .zip(&self.consistency)
            .map(|(level, count)| (level, count.load(Ordering::Relaxed)))
            .filter(|(_, count)| *count > 0)
            .collect()
    }
}
