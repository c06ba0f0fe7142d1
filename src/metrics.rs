//! Time-series metric store
//!
//! Every metric keeps a bounded FIFO history plus running aggregates. `min` and
//! `max` are all-time extremes and survive eviction; `avg` covers only the
//! retained window and is recomputed on every insertion.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, warn};

pub const FPS: &str = "fps";
pub const FRAME_TIME: &str = "frame_time_ms";
pub const HEAP_USED: &str = "heap_used_mb";
pub const HEAP_TOTAL: &str = "heap_total_mb";
pub const HEAP_PERCENT: &str = "heap_percent";
pub const RSS: &str = "rss_mb";
pub const EXTERNAL_MEMORY: &str = "external_memory_mb";
pub const CPU_PERCENT: &str = "cpu_percent";
pub const IPC_LATENCY: &str = "ipc_latency_ms";
pub const IPC_MESSAGES: &str = "ipc_messages";
pub const IPC_ERRORS: &str = "ipc_errors";
pub const VOICE_WAKE_WORD: &str = "voice_wake_word_ms";
pub const VOICE_STT: &str = "voice_stt_ms";
pub const VOICE_LLM: &str = "voice_llm_ms";
pub const VOICE_TTS: &str = "voice_tts_ms";
pub const VOICE_TOTAL: &str = "voice_total_ms";

/// Metric grouping used by summaries and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricCategory {
    Render,
    Memory,
    Cpu,
    Ipc,
    Voice,
    Custom,
}

/// Single recorded value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Unix epoch milliseconds
    pub timestamp: i64,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Metric {
    pub name: String,
    pub category: MetricCategory,
    pub current: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub history: VecDeque<DataPoint>,
    pub unit: String,
}

impl Metric {
    fn new(name: &str, category: MetricCategory, unit: &str, capacity: usize) -> Self {
        Self {
            name: name.to_string(),
            category,
            current: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            avg: 0.0,
            history: VecDeque::with_capacity(capacity.min(1024)),
            unit: unit.to_string(),
        }
    }

    pub fn has_samples(&self) -> bool {
        !self.history.is_empty()
    }

    fn push(&mut self, point: DataPoint, capacity: usize) {
        self.current = point.value;
        self.min = self.min.min(point.value);
        self.max = self.max.max(point.value);
        self.history.push_back(point);
        self.trim(capacity);
    }

    fn trim(&mut self, capacity: usize) {
        while self.history.len() > capacity {
            self.history.pop_front();
        }
        self.recompute_avg();
    }

    fn recompute_avg(&mut self) {
        self.avg = if self.history.is_empty() {
            0.0
        } else {
            self.history.iter().map(|p| p.value).sum::<f64>() / self.history.len() as f64
        };
    }

    fn clear(&mut self) {
        self.current = 0.0;
        self.min = f64::INFINITY;
        self.max = f64::NEG_INFINITY;
        self.avg = 0.0;
        self.history.clear();
    }
}

/// Aggregates without history, for summaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub category: MetricCategory,
    pub current: f64,
    /// `None` until the first value is recorded
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: f64,
    pub samples: usize,
    pub unit: String,
}

impl From<&Metric> for MetricSummary {
    fn from(metric: &Metric) -> Self {
        let seen = metric.min.is_finite();
        Self {
            category: metric.category,
            current: metric.current,
            min: seen.then_some(metric.min),
            max: seen.then_some(metric.max),
            avg: metric.avg,
            samples: metric.history.len(),
            unit: metric.unit.clone(),
        }
    }
}

/// Registry of named metrics with bounded histories
#[derive(Debug, Clone)]
pub struct MetricStore {
    metrics: BTreeMap<String, Metric>,
    capacity: usize,
}

impl MetricStore {
    /// Create a store pre-populated with the default registry
    pub fn new(capacity: usize) -> Self {
        let mut store = Self::empty(capacity);
        store.register_defaults();
        store
    }

    /// Create a store with no registered metrics
    pub fn empty(capacity: usize) -> Self {
        Self {
            metrics: BTreeMap::new(),
            capacity: capacity.max(1),
        }
    }

    fn register_defaults(&mut self) {
        let defaults: [(&str, MetricCategory, &str); 16] = [
            (FPS, MetricCategory::Render, "fps"),
            (FRAME_TIME, MetricCategory::Render, "ms"),
            (HEAP_USED, MetricCategory::Memory, "MB"),
            (HEAP_TOTAL, MetricCategory::Memory, "MB"),
            (HEAP_PERCENT, MetricCategory::Memory, "%"),
            (RSS, MetricCategory::Memory, "MB"),
            (EXTERNAL_MEMORY, MetricCategory::Memory, "MB"),
            (CPU_PERCENT, MetricCategory::Cpu, "%"),
            (IPC_LATENCY, MetricCategory::Ipc, "ms"),
            (IPC_MESSAGES, MetricCategory::Ipc, "count"),
            (IPC_ERRORS, MetricCategory::Ipc, "count"),
            (VOICE_WAKE_WORD, MetricCategory::Voice, "ms"),
            (VOICE_STT, MetricCategory::Voice, "ms"),
            (VOICE_LLM, MetricCategory::Voice, "ms"),
            (VOICE_TTS, MetricCategory::Voice, "ms"),
            (VOICE_TOTAL, MetricCategory::Voice, "ms"),
        ];
        for (name, category, unit) in defaults {
            self.register(name, category, unit);
        }
    }

    /// Register a metric. Re-registering an existing name keeps its data.
    pub fn register(&mut self, name: &str, category: MetricCategory, unit: &str) {
        if self.metrics.contains_key(name) {
            debug!("Metric {} already registered", name);
            return;
        }
        let capacity = self.capacity;
        self.metrics
            .insert(name.to_string(), Metric::new(name, category, unit, capacity));
        debug!("📈 Registered metric {} ({:?}, {})", name, category, unit);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.metrics.contains_key(name)
    }

    /// Record a value. Unknown names are logged and ignored.
    ///
    /// Returns whether the value was stored.
    pub fn record(
        &mut self,
        name: &str,
        value: f64,
        timestamp: i64,
        metadata: Option<HashMap<String, String>>,
    ) -> bool {
        let capacity = self.capacity;
        match self.metrics.get_mut(name) {
            Some(metric) => {
                metric.push(
                    DataPoint {
                        timestamp,
                        value,
                        metadata,
                    },
                    capacity,
                );
                true
            }
            None => {
                warn!("⚠️ Ignoring value for unregistered metric: {}", name);
                false
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Metric> {
        self.metrics.get(name)
    }

    /// Most recent `limit` points (all when `None`), oldest first
    pub fn history(&self, name: &str, limit: Option<usize>) -> Vec<DataPoint> {
        match self.metrics.get(name) {
            Some(metric) => {
                let skip = limit
                    .map(|n| metric.history.len().saturating_sub(n))
                    .unwrap_or(0);
                metric.history.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Windowed average, or `None` if nothing has been recorded
    pub fn avg(&self, name: &str) -> Option<f64> {
        self.metrics
            .get(name)
            .filter(|m| m.has_samples())
            .map(|m| m.avg)
    }

    pub fn current(&self, name: &str) -> Option<f64> {
        self.metrics
            .get(name)
            .filter(|m| m.has_samples())
            .map(|m| m.current)
    }

    pub fn max(&self, name: &str) -> Option<f64> {
        self.metrics
            .get(name)
            .filter(|m| m.has_samples())
            .map(|m| m.max)
    }

    pub fn summary(&self) -> BTreeMap<String, MetricSummary> {
        self.metrics
            .iter()
            .map(|(name, metric)| (name.clone(), MetricSummary::from(metric)))
            .collect()
    }

    pub fn all(&self) -> &BTreeMap<String, Metric> {
        &self.metrics
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change history capacity, evicting oldest points where needed
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        for metric in self.metrics.values_mut() {
            metric.trim(self.capacity);
        }
    }

    /// Clear all values and histories, keeping the registry
    pub fn clear(&mut self) {
        for metric in self.metrics.values_mut() {
            metric.clear();
        }
    }
}
