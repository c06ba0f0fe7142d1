use async_trait::async_trait;
use heapwatch::config::TelemetryConfig;
use heapwatch::errors::CollectionError;
use heapwatch::resources::{ProcessResourceSource, ResourceUsage, BYTES_PER_MB};
use heapwatch::{RemoteHeapEvaluator, RemoteHeapStats};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn mb(value: f64) -> u64 {
    (value * BYTES_PER_MB) as u64
}

/// Primary process source reporting a fixed heap and an idle CPU
pub struct FixedSource {
    pub used_mb: f64,
    pub limit_mb: f64,
}

impl ProcessResourceSource for FixedSource {
    fn read_usage(&mut self) -> Result<ResourceUsage, CollectionError> {
        Ok(ResourceUsage {
            cpu_time_ms: 1_000,
            heap_used_bytes: mb(self.used_mb),
            heap_total_bytes: mb(self.used_mb * 2.0),
            heap_limit_bytes: mb(self.limit_mb),
            rss_bytes: mb(self.used_mb),
            external_bytes: mb(1.0),
        })
    }
}

/// Surface whose heap grows by `step` bytes on every evaluation
pub struct GrowingSurface {
    pub used: AtomicU64,
    pub step: u64,
    pub calls: Arc<AtomicU64>,
}

#[async_trait]
impl RemoteHeapEvaluator for GrowingSurface {
    async fn evaluate_heap(&self) -> Result<RemoteHeapStats, CollectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let used = self.used.fetch_add(self.step, Ordering::SeqCst);
        Ok(RemoteHeapStats {
            used_heap: used,
            total_heap: used * 2,
            heap_limit: 0,
        })
    }
}

/// Surface that never answers in time
pub struct HangingSurface;

#[async_trait]
impl RemoteHeapEvaluator for HangingSurface {
    async fn evaluate_heap(&self) -> Result<RemoteHeapStats, CollectionError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(RemoteHeapStats::default())
    }
}

/// Fast-ticking config exporting into `dir`
pub fn fast_config(dir: &Path) -> TelemetryConfig {
    TelemetryConfig {
        sampling_interval_ms: 20,
        auxiliary_timeout_ms: 15,
        export_dir: dir.to_path_buf(),
        ..TelemetryConfig::default()
    }
}
