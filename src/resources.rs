//! Process resource usage for the primary process
//!
//! The sampler reads cumulative CPU time and memory figures through the
//! [`ProcessResourceSource`] trait; [`SysinfoResourceSource`] is the default
//! implementation backed by `sysinfo`.

use crate::errors::CollectionError;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

pub const BYTES_PER_MB: f64 = 1_048_576.0;

/// Raw resource figures for one process at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Cumulative user + system CPU time in milliseconds
    pub cpu_time_ms: u64,
    pub heap_used_bytes: u64,
    pub heap_total_bytes: u64,
    /// 0 when the limit is unknown
    pub heap_limit_bytes: u64,
    pub rss_bytes: u64,
    pub external_bytes: u64,
}

impl ResourceUsage {
    /// Heap usage as a percentage of the limit, `None` when the limit is unknown
    pub fn heap_percent(&self) -> Option<f64> {
        heap_percent(self.heap_used_bytes, self.heap_limit_bytes)
    }
}

/// `used / limit * 100`, guarding against an unavailable (zero) limit
pub fn heap_percent(used: u64, limit: u64) -> Option<f64> {
    if limit == 0 {
        None
    } else {
        Some(used as f64 / limit as f64 * 100.0)
    }
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

/// Capability returning resource usage for the monitored process
#[cfg_attr(test, automock)]
pub trait ProcessResourceSource: Send {
    fn read_usage(&mut self) -> Result<ResourceUsage, CollectionError>;
}

/// Reads the current process through `sysinfo`.
///
/// Resident memory stands in for heap usage, virtual memory for the heap
/// reservation and total system memory for the limit.
pub struct SysinfoResourceSource {
    system: System,
    pid: Pid,
}

impl SysinfoResourceSource {
    pub fn current_process() -> Self {
        Self::for_pid(std::process::id())
    }

    pub fn for_pid(pid: u32) -> Self {
        let mut system = System::new();
        system.refresh_memory();
        debug!(
            "🧠 Resource source for pid {} ({:.0} MB system memory)",
            pid,
            bytes_to_mb(system.total_memory())
        );
        Self {
            system,
            pid: Pid::from_u32(pid),
        }
    }
}

impl ProcessResourceSource for SysinfoResourceSource {
    fn read_usage(&mut self) -> Result<ResourceUsage, CollectionError> {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);

        let process = self.system.process(self.pid).ok_or_else(|| {
            CollectionError::ResourceUnavailable(format!("process {} not found", self.pid))
        })?;

        Ok(ResourceUsage {
            cpu_time_ms: process.accumulated_cpu_time(),
            heap_used_bytes: process.memory(),
            heap_total_bytes: process.virtual_memory(),
            heap_limit_bytes: self.system.total_memory(),
            rss_bytes: process.memory(),
            external_bytes: 0,
        })
    }
}

/// CPU percentage from cumulative CPU time deltas between samples
#[derive(Debug, Default)]
pub struct CpuTracker {
    last: Option<(u64, Instant)>,
}

impl CpuTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Percentage of one core used since the previous sample, clamped to [0, 100].
    ///
    /// The first sample has no baseline and reports 0.
    pub fn sample(&mut self, cpu_time_ms: u64, now: Instant) -> f64 {
        let percent = match self.last {
            Some((last_cpu, last_wall)) => {
                let wall_ms = now.saturating_duration_since(last_wall).as_secs_f64() * 1000.0;
                if wall_ms <= 0.0 {
                    0.0
                } else {
                    let cpu_ms = cpu_time_ms.saturating_sub(last_cpu) as f64;
                    (cpu_ms / wall_ms * 100.0).clamp(0.0, 100.0)
                }
            }
            None => 0.0,
        };
        self.last = Some((cpu_time_ms, now));
        percent
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cpu_first_sample_zero() {
        let mut tracker = CpuTracker::new();
        assert_eq!(tracker.sample(5_000, Instant::now()), 0.0);
    }

    #[test]
    fn test_cpu_percent_from_deltas() {
        let mut tracker = CpuTracker::new();
        let t0 = Instant::now();
        tracker.sample(1_000, t0);
        let percent = tracker.sample(1_250, t0 + Duration::from_millis(1000));
        assert!((percent - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_cpu_percent_clamped() {
        let mut tracker = CpuTracker::new();
        let t0 = Instant::now();
        tracker.sample(0, t0);
        // Multi-threaded work can exceed one core
        let percent = tracker.sample(4_000, t0 + Duration::from_millis(1000));
        assert_eq!(percent, 100.0);

        // Counter going backwards must not go negative
        let percent = tracker.sample(10, t0 + Duration::from_millis(2000));
        assert_eq!(percent, 0.0);
    }

    #[test]
    fn test_heap_percent_zero_limit() {
        assert_eq!(heap_percent(100, 0), None);
        assert_eq!(heap_percent(50, 200), Some(25.0));
        let usage = ResourceUsage::default();
        assert_eq!(usage.heap_percent(), None);
    }

    #[test]
    fn test_sysinfo_reads_current_process() {
        let mut source = SysinfoResourceSource::current_process();
        let usage = source.read_usage().expect("current process should be visible");
        assert!(usage.rss_bytes > 0);
        assert!(usage.heap_limit_bytes > 0);
    }
}
