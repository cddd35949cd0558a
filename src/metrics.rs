//! Timing histograms for the lookup pipeline.
//! Each stage records elapsed microseconds into a fixed-capacity sample ring;
//! summaries expose p50/p95/p99 per metric.

use std::collections::HashMap;

use parking_lot::Mutex;

const RING_CAPACITY: usize = 1024;

/// Bounded sample window. Grows until full, then overwrites oldest-first.
struct SampleRing {
    samples: Vec<f64>,
    write_pos: usize,
}

impl SampleRing {
    fn new() -> Self {
        Self {
            samples: Vec::with_capacity(RING_CAPACITY),
            write_pos: 0,
        }
    }

    fn record(&mut self, value: f64) {
        if self.samples.len() == RING_CAPACITY {
            self.samples[self.write_pos] = value;
            self.write_pos = (self.write_pos + 1) % RING_CAPACITY;
        } else {
            self.samples.push(value);
        }
    }

    /// Nearest-rank quantile, `q` in 0.0..=1.0. Zero when no samples exist.
    fn quantile(&self, q: f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let idx = ((sorted.len() - 1) as f64 * q.clamp(0.0, 1.0)).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }
}

/// Histograms for all named metrics, shared across the background context.
pub struct MetricsRegistry {
    rings: Mutex<HashMap<&'static str, SampleRing>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            rings: Mutex::new(HashMap::new()),
        }
    }

    /// Record one sample (microseconds) for the named metric.
    pub fn record(&self, name: &'static str, value_us: f64) {
        let mut rings = self.rings.lock();
        rings.entry(name).or_insert_with(SampleRing::new).record(value_us);
        tracing::trace!(metric = name, value_us, "metric_recorded");
    }

    /// Quantile (`q` in 0.0..=1.0) for one metric, in microseconds.
    pub fn quantile(&self, name: &str, q: f64) -> f64 {
        let rings = self.rings.lock();
        rings.get(name).map(|ring| ring.quantile(q)).unwrap_or(0.0)
    }

    /// Snapshot of every metric at p50/p95/p99.
    pub fn summary(&self) -> HashMap<String, MetricSummary> {
        let rings = self.rings.lock();
        rings
            .iter()
            .map(|(&name, ring)| {
                (
                    name.to_string(),
                    MetricSummary {
                        p50_us: ring.quantile(0.50),
                        p95_us: ring.quantile(0.95),
                        p99_us: ring.quantile(0.99),
                        count: ring.samples.len(),
                    },
                )
            })
            .collect()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricSummary {
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
    pub count: usize,
}

/// Well-known metric names (constants to avoid typos).
pub mod metric_names {
    pub const LOOKUP_TOTAL: &str = "t_lookup_total";
    pub const LOOKUP_LOCAL_DICT: &str = "t_lookup_local_dict";
    pub const LOOKUP_CACHE: &str = "t_lookup_cache";
    pub const LOOKUP_REMOTE: &str = "t_lookup_remote";
    pub const CACHE_WRITE: &str = "t_cache_write";
    pub const QUEUE_WAIT_BG: &str = "queue_wait_bg";
}
