//! Point-in-time snapshots assembled once per sampling tick

use crate::bottleneck::Bottleneck;
use crate::resources::{bytes_to_mb, ResourceUsage};
use crate::timing::{IpcSummary, RenderMetrics, VoiceTimings};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub heap_used_mb: f64,
    pub heap_total_mb: f64,
    pub heap_limit_mb: f64,
    /// `None` when the heap limit is unavailable
    pub heap_percent: Option<f64>,
    pub rss_mb: f64,
    pub external_mb: f64,
}

impl From<&ResourceUsage> for MemorySnapshot {
    fn from(usage: &ResourceUsage) -> Self {
        Self {
            heap_used_mb: bytes_to_mb(usage.heap_used_bytes),
            heap_total_mb: bytes_to_mb(usage.heap_total_bytes),
            heap_limit_mb: bytes_to_mb(usage.heap_limit_bytes),
            heap_percent: usage.heap_percent(),
            rss_mb: bytes_to_mb(usage.rss_bytes),
            external_mb: bytes_to_mb(usage.external_bytes),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub percent: f64,
    pub cpu_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unix epoch milliseconds
    pub timestamp: i64,
    pub memory: MemorySnapshot,
    pub cpu: CpuSnapshot,
    pub ipc_summary: IpcSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_timings: Option<VoiceTimings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_metrics: Option<RenderMetrics>,
    pub bottlenecks: Vec<Bottleneck>,
}

/// Bounded FIFO of snapshots
#[derive(Debug, Clone)]
pub struct SnapshotBuffer {
    snapshots: VecDeque<Snapshot>,
    capacity: usize,
}

impl SnapshotBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, snapshot: Snapshot) {
        self.snapshots.push_back(snapshot);
        while self.snapshots.len() > self.capacity {
            self.snapshots.pop_front();
        }
    }

    /// The most recent `limit` snapshots (all when `None`), oldest first
    pub fn recent(&self, limit: Option<usize>) -> Vec<Snapshot> {
        let take = limit.unwrap_or(self.snapshots.len()).min(self.snapshots.len());
        self.snapshots
            .iter()
            .skip(self.snapshots.len() - take)
            .cloned()
            .collect()
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.back()
    }

    pub fn first(&self) -> Option<&Snapshot> {
        self.snapshots.front()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn total_bottlenecks(&self) -> usize {
        self.snapshots.iter().map(|s| s.bottlenecks.len()).sum()
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.snapshots.len() > self.capacity {
            self.snapshots.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::BYTES_PER_MB;

    fn snapshot(ts: i64) -> Snapshot {
        Snapshot {
            timestamp: ts,
            memory: MemorySnapshot::default(),
            cpu: CpuSnapshot::default(),
            ipc_summary: IpcSummary::default(),
            voice_timings: None,
            render_metrics: None,
            bottlenecks: Vec::new(),
        }
    }

    #[test]
    fn test_buffer_evicts_oldest() {
        let mut buffer = SnapshotBuffer::new(3);
        for ts in 0..5 {
            buffer.push(snapshot(ts));
        }

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.first().unwrap().timestamp, 2);
        assert_eq!(buffer.latest().unwrap().timestamp, 4);
    }

    #[test]
    fn test_recent_limit() {
        let mut buffer = SnapshotBuffer::new(10);
        for ts in 0..5 {
            buffer.push(snapshot(ts));
        }

        let last_two: Vec<i64> = buffer.recent(Some(2)).iter().map(|s| s.timestamp).collect();
        assert_eq!(last_two, vec![3, 4]);
        assert_eq!(buffer.recent(None).len(), 5);
        assert_eq!(buffer.recent(Some(50)).len(), 5);
    }

    #[test]
    fn test_memory_snapshot_without_limit() {
        let usage = ResourceUsage {
            cpu_time_ms: 10,
            heap_used_bytes: (64.0 * BYTES_PER_MB) as u64,
            heap_total_bytes: (128.0 * BYTES_PER_MB) as u64,
            heap_limit_bytes: 0,
            rss_bytes: (80.0 * BYTES_PER_MB) as u64,
            external_bytes: 0,
        };
        let memory = MemorySnapshot::from(&usage);
        assert_eq!(memory.heap_percent, None);
        assert!((memory.heap_used_mb - 64.0).abs() < 1e-9);
        assert!((memory.rss_mb - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_optional_sections_omitted() {
        let json = serde_json::to_value(snapshot(1)).unwrap();
        assert!(json.get("voice_timings").is_none());
        assert!(json.get("render_metrics").is_none());
        assert!(json["bottlenecks"].as_array().unwrap().is_empty());
    }
}
