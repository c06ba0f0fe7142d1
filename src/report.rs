//! Performance report generation and export

use crate::alerts::{Alert, AlertManager};
use crate::config::ThresholdTable;
use crate::errors::TelemetryError;
use crate::metrics::{self, Metric, MetricStore};
use crate::sampler::{Snapshot, SnapshotBuffer};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

/// Number of most recent alerts carried in a report
const REPORT_ALERT_LIMIT: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSummary {
    pub avg_fps: f64,
    /// Average heap used, MB
    pub avg_memory: f64,
    pub avg_cpu: f64,
    pub avg_ipc_latency: f64,
    pub bottleneck_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: String,
    pub duration_since_start_ms: i64,
    pub summary: ReportSummary,
    pub snapshots: Vec<Snapshot>,
    pub metrics: BTreeMap<String, Metric>,
    pub recommendations: Vec<String>,
    pub alerts: Vec<Alert>,
}

pub fn generate_report(
    store: &MetricStore,
    snapshots: &SnapshotBuffer,
    alerts: &AlertManager,
    thresholds: &ThresholdTable,
    started_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Report {
    let summary = ReportSummary {
        avg_fps: store.avg(metrics::FPS).unwrap_or(0.0),
        avg_memory: store.avg(metrics::HEAP_USED).unwrap_or(0.0),
        avg_cpu: store.avg(metrics::CPU_PERCENT).unwrap_or(0.0),
        avg_ipc_latency: store.avg(metrics::IPC_LATENCY).unwrap_or(0.0),
        bottleneck_count: snapshots.total_bottlenecks(),
    };

    Report {
        generated_at: now.to_rfc3339(),
        duration_since_start_ms: started_at
            .map(|start| (now - start).num_milliseconds().max(0))
            .unwrap_or(0),
        summary,
        snapshots: snapshots.recent(None),
        metrics: store.all().clone(),
        recommendations: generate_recommendations(store, snapshots, thresholds),
        alerts: alerts.recent(REPORT_ALERT_LIMIT),
    }
}

fn generate_recommendations(
    store: &MetricStore,
    snapshots: &SnapshotBuffer,
    thresholds: &ThresholdTable,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    if let Some(fps) = store.avg(metrics::FPS) {
        if fps < thresholds.fps.warning {
            recommendations.push(format!(
                "Average frame rate below target ({:.1} fps). Reduce per-frame rendering work and debounce UI updates.",
                fps
            ));
        }
    }

    if let Some(frame_time) = store.max(metrics::FRAME_TIME) {
        if frame_time > thresholds.frame_time_ms.critical {
            recommendations.push(format!(
                "Frame time peaked at {:.1}ms. Break long tasks into smaller chunks.",
                frame_time
            ));
        }
    }

    if let Some(heap_percent) = store.avg(metrics::HEAP_PERCENT) {
        if heap_percent > thresholds.memory_percent.warning {
            recommendations.push(format!(
                "High memory usage ({:.1}% of heap limit). Bound caches and release unused resources.",
                heap_percent
            ));
        }
    }

    if let Some(cpu) = store.avg(metrics::CPU_PERCENT) {
        if cpu > thresholds.cpu_percent.warning {
            recommendations.push(format!(
                "Sustained CPU usage ({:.1}%). Profile hot paths and move heavy work off the main loop.",
                cpu
            ));
        }
    }

    if let Some(ipc) = store.avg(metrics::IPC_LATENCY) {
        if ipc > thresholds.ipc_latency_ms.warning {
            recommendations.push(format!(
                "Slow IPC ({:.1}ms average). Batch messages and reduce payload sizes.",
                ipc
            ));
        }
    }

    if let Some(latest) = snapshots.latest() {
        for bottleneck in latest.bottlenecks.iter().take(3) {
            if !recommendations.iter().any(|r| r.contains(&bottleneck.recommendation)) {
                recommendations.push(bottleneck.recommendation.clone());
            }
        }
    }

    if recommendations.is_empty() {
        recommendations.push("No performance issues detected.".to_string());
    }

    recommendations
}

/// Default file name for a report generated at `now`
pub fn report_file_name(now: DateTime<Utc>) -> String {
    format!("performance-report-{}.json", now.format("%Y%m%d-%H%M%S-%3f"))
}

/// Write `report` as pretty JSON.
///
/// With no explicit `path` the file lands in `export_dir` under a timestamped
/// name. The document is written to a temporary file in the destination
/// directory and then renamed over the final path.
pub fn export_report(
    report: &Report,
    path: Option<&Path>,
    export_dir: &Path,
    now: DateTime<Utc>,
) -> Result<PathBuf, TelemetryError> {
    let target = match path {
        Some(path) => path.to_path_buf(),
        None => export_dir.join(report_file_name(now)),
    };
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    std::fs::create_dir_all(&dir).map_err(|e| TelemetryError::io(&dir, e))?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| TelemetryError::io(&dir, e))?;
    serde_json::to_writer_pretty(&mut tmp, report)?;
    tmp.flush().map_err(|e| TelemetryError::io(tmp.path(), e))?;
    tmp.persist(&target)?;

    info!("📄 Exported performance report to {}", target.display());
    Ok(target)
}
