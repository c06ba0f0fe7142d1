//! Threshold-based bottleneck detection
//!
//! A pure function of current metric values and the threshold table. Dimensions
//! with no recorded samples are skipped.

use crate::config::{ThresholdDirection, ThresholdPair, ThresholdTable};
use crate::metrics::{self, MetricStore};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BottleneckType {
    LowFrameRate,
    HighMemory,
    HighCpu,
    SlowIpc,
    LongFrameTime,
}

impl BottleneckType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BottleneckType::LowFrameRate => "low-frame-rate",
            BottleneckType::HighMemory => "high-memory",
            BottleneckType::HighCpu => "high-cpu",
            BottleneckType::SlowIpc => "slow-ipc",
            BottleneckType::LongFrameTime => "long-frame-time",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    #[serde(rename = "type")]
    pub kind: BottleneckType,
    pub severity: Severity,
    pub description: String,
    pub value: f64,
    pub threshold: f64,
    pub recommendation: String,
}

/// Which aggregate of a metric a dimension is judged on
#[derive(Debug, Clone, Copy)]
enum Aggregate {
    Current,
    Average,
}

struct Dimension {
    kind: BottleneckType,
    metric: &'static str,
    aggregate: Aggregate,
    direction: ThresholdDirection,
    label: &'static str,
    unit: &'static str,
    recommendation: &'static str,
}

const DIMENSIONS: [Dimension; 5] = [
    Dimension {
        kind: BottleneckType::LowFrameRate,
        metric: metrics::FPS,
        aggregate: Aggregate::Average,
        direction: ThresholdDirection::Below,
        label: "Average frame rate",
        unit: "fps",
        recommendation: "Reduce render work per frame: debounce state updates and avoid layout thrashing.",
    },
    Dimension {
        kind: BottleneckType::HighMemory,
        metric: metrics::HEAP_PERCENT,
        aggregate: Aggregate::Current,
        direction: ThresholdDirection::Above,
        label: "Heap usage",
        unit: "%",
        recommendation: "Release cached data and check for retained listeners or timers.",
    },
    Dimension {
        kind: BottleneckType::HighCpu,
        metric: metrics::CPU_PERCENT,
        aggregate: Aggregate::Current,
        direction: ThresholdDirection::Above,
        label: "CPU usage",
        unit: "%",
        recommendation: "Move heavy computation off the main loop or batch it.",
    },
    Dimension {
        kind: BottleneckType::SlowIpc,
        metric: metrics::IPC_LATENCY,
        aggregate: Aggregate::Average,
        direction: ThresholdDirection::Above,
        label: "Average IPC latency",
        unit: "ms",
        recommendation: "Batch IPC messages and shrink payloads crossing the process boundary.",
    },
    Dimension {
        kind: BottleneckType::LongFrameTime,
        metric: metrics::FRAME_TIME,
        aggregate: Aggregate::Average,
        direction: ThresholdDirection::Above,
        label: "Average frame time",
        unit: "ms",
        recommendation: "Split long tasks so each frame stays within budget.",
    },
];

fn threshold_for(table: &ThresholdTable, kind: BottleneckType) -> ThresholdPair {
    match kind {
        BottleneckType::LowFrameRate => table.fps,
        BottleneckType::HighMemory => table.memory_percent,
        BottleneckType::HighCpu => table.cpu_percent,
        BottleneckType::SlowIpc => table.ipc_latency_ms,
        BottleneckType::LongFrameTime => table.frame_time_ms,
    }
}

fn breaches(value: f64, threshold: f64, direction: ThresholdDirection) -> bool {
    match direction {
        ThresholdDirection::Above => value > threshold,
        ThresholdDirection::Below => value < threshold,
    }
}

/// Compare `value` against a pair; critical wins when both match
pub fn classify(value: f64, pair: ThresholdPair, direction: ThresholdDirection) -> Option<(Severity, f64)> {
    if breaches(value, pair.critical, direction) {
        Some((Severity::Critical, pair.critical))
    } else if breaches(value, pair.warning, direction) {
        Some((Severity::Warning, pair.warning))
    } else {
        None
    }
}

/// Evaluate every tracked dimension against the threshold table
pub fn detect_bottlenecks(store: &MetricStore, thresholds: &ThresholdTable) -> Vec<Bottleneck> {
    let mut found = Vec::new();

    for dim in DIMENSIONS.iter() {
        let value = match dim.aggregate {
            Aggregate::Current => store.current(dim.metric),
            Aggregate::Average => store.avg(dim.metric),
        };
        let Some(value) = value else {
            continue;
        };

        let pair = threshold_for(thresholds, dim.kind);
        if let Some((severity, threshold)) = classify(value, pair, dim.direction) {
            let relation = match dim.direction {
                ThresholdDirection::Above => "above",
                ThresholdDirection::Below => "below",
            };
            found.push(Bottleneck {
                kind: dim.kind,
                severity,
                description: format!(
                    "{} {:.1}{} is {} the {:?} threshold of {:.1}{}",
                    dim.label, value, dim.unit, relation, severity, threshold, dim.unit
                ),
                value,
                threshold,
                recommendation: dim.recommendation.to_string(),
            });
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_fps_critical_only() {
        let mut store = MetricStore::new(10);
        store.record(metrics::FPS, 25.0, 0, None);

        let mut thresholds = ThresholdTable::default();
        thresholds.fps = ThresholdPair::new(45.0, 30.0);

        let found = detect_bottlenecks(&store, &thresholds);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, BottleneckType::LowFrameRate);
        assert_eq!(found[0].severity, Severity::Critical);
        assert_eq!(found[0].threshold, 30.0);
    }

    #[test]
    fn test_fps_warning_band() {
        let mut store = MetricStore::new(10);
        store.record(metrics::FPS, 40.0, 0, None);
        let found = detect_bottlenecks(&store, &ThresholdTable::default());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].severity, Severity::Warning);
    }

    #[test]
    fn test_no_samples_no_bottlenecks() {
        let store = MetricStore::new(10);
        assert!(detect_bottlenecks(&store, &ThresholdTable::default()).is_empty());
    }

    #[test]
    fn test_healthy_values() {
        let mut store = MetricStore::new(10);
        store.record(metrics::FPS, 60.0, 0, None);
        store.record(metrics::CPU_PERCENT, 20.0, 0, None);
        store.record(metrics::HEAP_PERCENT, 30.0, 0, None);
        store.record(metrics::IPC_LATENCY, 5.0, 0, None);
        store.record(metrics::FRAME_TIME, 16.0, 0, None);
        assert!(detect_bottlenecks(&store, &ThresholdTable::default()).is_empty());
    }

    #[test]
    fn test_multiple_dimensions() {
        let mut store = MetricStore::new(10);
        store.record(metrics::CPU_PERCENT, 95.0, 0, None);
        store.record(metrics::HEAP_PERCENT, 75.0, 0, None);
        store.record(metrics::IPC_LATENCY, 80.0, 0, None);

        let found = detect_bottlenecks(&store, &ThresholdTable::default());
        assert_eq!(found.len(), 3);
        let cpu = found.iter().find(|b| b.kind == BottleneckType::HighCpu).unwrap();
        assert_eq!(cpu.severity, Severity::Critical);
        let mem = found.iter().find(|b| b.kind == BottleneckType::HighMemory).unwrap();
        assert_eq!(mem.severity, Severity::Warning);
        let ipc = found.iter().find(|b| b.kind == BottleneckType::SlowIpc).unwrap();
        assert_eq!(ipc.severity, Severity::Warning);
    }

    #[test]
    fn test_ipc_uses_average() {
        let mut store = MetricStore::new(10);
        store.record(metrics::IPC_LATENCY, 10.0, 0, None);
        store.record(metrics::IPC_LATENCY, 200.0, 0, None);
        // avg 105 > critical 100
        let found = detect_bottlenecks(&store, &ThresholdTable::default());
        assert_eq!(found[0].severity, Severity::Critical);
        assert!((found[0].value - 105.0).abs() < 1e-9);
    }

    #[test]
    fn test_deterministic() {
        let mut store = MetricStore::new(10);
        store.record(metrics::CPU_PERCENT, 85.0, 0, None);
        let thresholds = ThresholdTable::default();
        assert_eq!(detect_bottlenecks(&store, &thresholds), detect_bottlenecks(&store, &thresholds));
    }
}
