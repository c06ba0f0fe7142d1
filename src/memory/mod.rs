//! Per-process heap sample history, growth analysis and leak classification

pub mod leak;
pub mod trend;

pub use leak::{classify_leak, LeakCounters, LeakPattern, LeakPatternMatch, LeakSeverity};
pub use trend::{analyze_samples, GrowthAnalysis, TrendDirection};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Buffer key for the monitored host process
pub const PRIMARY_PROCESS_ID: &str = "primary";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessKind {
    Primary,
    Auxiliary,
}

/// Heap figures for one process at one instant, in bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessMemorySample {
    /// Unix epoch milliseconds
    pub timestamp: i64,
    pub process_id: String,
    pub process_kind: ProcessKind,
    pub heap_used: u64,
    pub heap_total: u64,
    pub heap_limit: u64,
    pub resident_set_size: u64,
    pub external_memory: u64,
}

/// One bounded FIFO of samples per process identity
#[derive(Debug, Clone)]
pub struct SampleBuffers {
    buffers: BTreeMap<String, VecDeque<ProcessMemorySample>>,
    capacity: usize,
}

impl SampleBuffers {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: BTreeMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, sample: ProcessMemorySample) {
        let capacity = self.capacity;
        let buffer = self
            .buffers
            .entry(sample.process_id.clone())
            .or_insert_with(|| VecDeque::with_capacity(capacity.min(1024)));
        buffer.push_back(sample);
        while buffer.len() > capacity {
            buffer.pop_front();
        }
    }

    pub fn samples(&self, process_id: &str) -> Option<&VecDeque<ProcessMemorySample>> {
        self.buffers.get(process_id)
    }

    pub fn latest(&self, process_id: &str) -> Option<&ProcessMemorySample> {
        self.buffers.get(process_id).and_then(|b| b.back())
    }

    /// Resolve the buffer for a kind and optional id.
    ///
    /// Without an id, auxiliary lookups pick the first auxiliary process by id.
    pub fn select(&self, kind: ProcessKind, process_id: Option<&str>) -> Option<&VecDeque<ProcessMemorySample>> {
        match (kind, process_id) {
            (ProcessKind::Primary, _) => self.buffers.get(PRIMARY_PROCESS_ID),
            (ProcessKind::Auxiliary, Some(id)) => self
                .buffers
                .get(id)
                .filter(|b| b.back().map(|s| s.process_kind) == Some(ProcessKind::Auxiliary)),
            (ProcessKind::Auxiliary, None) => self.buffers.values().find(|b| {
                b.back().map(|s| s.process_kind) == Some(ProcessKind::Auxiliary)
            }),
        }
    }

    pub fn process_ids(&self) -> impl Iterator<Item = &String> {
        self.buffers.keys()
    }

    pub fn remove(&mut self, process_id: &str) {
        self.buffers.remove(process_id);
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        for buffer in self.buffers.values_mut() {
            while buffer.len() > self.capacity {
                buffer.pop_front();
            }
        }
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, kind: ProcessKind, ts: i64, used: u64) -> ProcessMemorySample {
        ProcessMemorySample {
            timestamp: ts,
            process_id: id.to_string(),
            process_kind: kind,
            heap_used: used,
            heap_total: used * 2,
            heap_limit: 0,
            resident_set_size: 0,
            external_memory: 0,
        }
    }

    #[test]
    fn test_buffer_bounded_per_process() {
        let mut buffers = SampleBuffers::new(3);
        for i in 0..5 {
            buffers.push(sample(PRIMARY_PROCESS_ID, ProcessKind::Primary, i, i as u64));
            buffers.push(sample("overlay", ProcessKind::Auxiliary, i, 10 + i as u64));
        }

        let primary = buffers.samples(PRIMARY_PROCESS_ID).unwrap();
        assert_eq!(primary.len(), 3);
        assert_eq!(primary.front().unwrap().heap_used, 2);
        assert_eq!(buffers.samples("overlay").unwrap().len(), 3);
        assert_eq!(buffers.latest("overlay").unwrap().heap_used, 14);
    }

    #[test]
    fn test_select_by_kind() {
        let mut buffers = SampleBuffers::new(10);
        buffers.push(sample(PRIMARY_PROCESS_ID, ProcessKind::Primary, 0, 1));
        buffers.push(sample("settings", ProcessKind::Auxiliary, 0, 2));
        buffers.push(sample("overlay", ProcessKind::Auxiliary, 0, 3));

        let primary = buffers.select(ProcessKind::Primary, None).unwrap();
        assert_eq!(primary.back().unwrap().heap_used, 1);

        let first_aux = buffers.select(ProcessKind::Auxiliary, None).unwrap();
        assert_eq!(first_aux.back().unwrap().process_id, "overlay");

        let settings = buffers.select(ProcessKind::Auxiliary, Some("settings")).unwrap();
        assert_eq!(settings.back().unwrap().heap_used, 2);

        assert!(buffers.select(ProcessKind::Auxiliary, Some(PRIMARY_PROCESS_ID)).is_none());
        assert!(buffers.select(ProcessKind::Auxiliary, Some("missing")).is_none());
    }

    #[test]
    fn test_shrink_capacity() {
        let mut buffers = SampleBuffers::new(5);
        for i in 0..5 {
            buffers.push(sample(PRIMARY_PROCESS_ID, ProcessKind::Primary, i, i as u64));
        }
        buffers.set_capacity(2);
        let primary = buffers.samples(PRIMARY_PROCESS_ID).unwrap();
        assert_eq!(primary.iter().map(|s| s.heap_used).collect::<Vec<_>>(), vec![3, 4]);
    }
}
