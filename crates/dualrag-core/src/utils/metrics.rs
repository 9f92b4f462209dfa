//! Routing metrics
//!
//! In-process counters and latency histograms, exportable in Prometheus text
//! format. Handles are cheap clones sharing the same atomics.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Default latency buckets, in milliseconds
pub const LATENCY_BUCKETS_MS: [f64; 10] = [
    5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 10000.0,
];

/// Monotonic counter
#[derive(Debug, Default, Clone)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    /// Add one
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Current value
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Cumulative histogram over fixed upper bounds
#[derive(Debug, Clone)]
pub struct Histogram {
    bounds: Arc<[f64]>,
    buckets: Arc<[AtomicU64]>,
    // Sum in microunits, so it fits an atomic integer
    sum_micros: Arc<AtomicU64>,
    count: Arc<AtomicU64>,
}

impl Histogram {
    /// Histogram with the given ascending upper bounds
    #[must_use]
    pub fn with_bounds(bounds: &[f64]) -> Self {
        Self {
            bounds: bounds.into(),
            buckets: bounds.iter().map(|_| AtomicU64::new(0)).collect(),
            sum_micros: Arc::new(AtomicU64::new(0)),
            count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record one observation; negative and NaN values count as zero
    pub fn observe(&self, value: f64) {
        let value = if value.is_nan() { 0.0 } else { value.max(0.0) };
        self.sum_micros
            .fetch_add((value * 1_000_000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        for (bound, bucket) in self.bounds.iter().zip(self.buckets.iter()) {
            if value <= *bound {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Record a duration in milliseconds
    pub fn observe_duration(&self, elapsed: Duration) {
        self.observe(elapsed.as_secs_f64() * 1000.0);
    }

    /// Observations so far
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Sum of all observations
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }

    /// `(upper bound, cumulative count)` per bucket
    #[must_use]
    pub fn buckets(&self) -> Vec<(f64, u64)> {
        self.bounds
            .iter()
            .zip(self.buckets.iter())
            .map(|(bound, count)| (*bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::with_bounds(&LATENCY_BUCKETS_MS)
    }
}

/// Named metrics, created on first use
#[derive(Debug, Default, Clone)]
pub struct MetricsRegistry {
    counters: Arc<RwLock<BTreeMap<String, Counter>>>,
    histograms: Arc<RwLock<BTreeMap<String, Histogram>>>,
}

impl MetricsRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter `name`, created at zero if absent
    pub fn counter(&self, name: &str) -> Counter {
        if let Some(counter) = self
            .counters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
        {
            return counter.clone();
        }
        self.counters
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Histogram `name` with latency buckets, created empty if absent
    pub fn histogram(&self, name: &str) -> Histogram {
        if let Some(histogram) = self
            .histograms
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
        {
            return histogram.clone();
        }
        self.histograms
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Current value of counter `name`; zero if it was never touched
    #[must_use]
    pub fn counter_value(&self, name: &str) -> u64 {
        self.counters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map_or(0, Counter::get)
    }

    /// Counter values by name, sorted
    #[must_use]
    pub fn counters(&self) -> BTreeMap<String, u64> {
        self.counters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(name, counter)| (name.clone(), counter.get()))
            .collect()
    }

    /// Prometheus text exposition, metrics sorted by name
    #[must_use]
    pub fn export_prometheus(&self) -> String {
        let mut out = String::new();

        for (name, value) in self.counters() {
            out.push_str(&format!("# TYPE {name} counter\n{name} {value}\n"));
        }

        let histograms = self.histograms.read().unwrap_or_else(|e| e.into_inner());
        for (name, histogram) in histograms.iter() {
            out.push_str(&format!("# TYPE {name} histogram\n"));
            for (bound, count) in histogram.buckets() {
                out.push_str(&format!("{name}_bucket{{le=\"{bound}\"}} {count}\n"));
            }
            out.push_str(&format!(
                "{name}_bucket{{le=\"+Inf\"}} {}\n{name}_sum {}\n{name}_count {}\n",
                histogram.count(),
                histogram.sum(),
                histogram.count()
            ));
        }

        out
    }
}
