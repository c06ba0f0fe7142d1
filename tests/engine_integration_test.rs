use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use heapwatch::config::HeapwatchConfig;
use heapwatch::{
    AlertKind, LeakPattern, ProcessKind, TelemetryConfig, TelemetryEngine, TelemetryEvent, TrendDirection,
};

mod fixtures;
use fixtures::{fast_config, mb, FixedSource, GrowingSurface, HangingSurface};

fn engine(config: TelemetryConfig, used_mb: f64, limit_mb: f64) -> TelemetryEngine {
    TelemetryEngine::with_resource_source(config, Box::new(FixedSource { used_mb, limit_mb }))
        .expect("valid config")
}

#[tokio::test]
async fn test_running_engine_collects_and_exports() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(fast_config(dir.path()), 128.0, 1024.0);

    let calls = Arc::new(AtomicU64::new(0));
    engine.register_surface(
        "overlay",
        Arc::new(GrowingSurface {
            used: AtomicU64::new(mb(50.0)),
            step: mb(0.5),
            calls: Arc::clone(&calls),
        }),
    );
    engine.register_surface("stuck", Arc::new(HangingSurface));

    engine.start().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    engine.stop();

    let snapshots = engine.get_snapshots(None);
    assert!(snapshots.len() >= 3, "expected several ticks, got {}", snapshots.len());
    assert!(calls.load(Ordering::SeqCst) >= 2, "hanging surface must not stall the loop");

    let overlay = engine.analyze_growth(ProcessKind::Auxiliary, Some("overlay"));
    assert!(overlay.sample_count >= 2);
    assert_eq!(
        engine.analyze_growth(ProcessKind::Auxiliary, Some("stuck")).sample_count,
        0
    );

    let leak = engine
        .get_alerts(100)
        .into_iter()
        .find(|a| a.kind == AlertKind::LeakDetected)
        .expect("steadily growing surface should be flagged");
    assert_eq!(leak.process_id.as_deref(), Some("overlay"));
    assert_eq!(leak.process_kind, ProcessKind::Auxiliary);
    assert_eq!(leak.leak_pattern, Some(LeakPattern::UnboundedCache));

    let path = engine.export_report(None).unwrap();
    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(report["snapshots"].as_array().unwrap().len(), snapshots.len());
    assert!((report["summary"]["avg_memory"].as_f64().unwrap() - 128.0).abs() < 1e-6);
    assert!(report["duration_since_start_ms"].as_i64().unwrap() >= 200);
    assert!(report["metrics"]["heap_used_mb"]["history"].is_array());
}

#[tokio::test]
async fn test_stop_discards_late_collection() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(fast_config(dir.path()), 64.0, 1024.0);
    let calls = Arc::new(AtomicU64::new(0));
    engine.register_surface(
        "overlay",
        Arc::new(GrowingSurface {
            used: AtomicU64::new(mb(10.0)),
            step: 0,
            calls: Arc::clone(&calls),
        }),
    );

    engine.start().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    engine.stop();

    let samples = engine.analyze_growth(ProcessKind::Auxiliary, None).sample_count;
    let calls_at_stop = calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(calls.load(Ordering::SeqCst) <= calls_at_stop + 1);
    assert_eq!(engine.analyze_growth(ProcessKind::Auxiliary, None).sample_count, samples);
    assert!(!engine.get_status().running);
}

#[tokio::test]
async fn test_sampling_interval_hot_reload() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(fast_config(dir.path()), 64.0, 1024.0);
    let mut events = engine.subscribe();

    engine.start().unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    let slower = TelemetryConfig {
        sampling_interval_ms: 10_000,
        ..engine.config()
    };
    engine.update_config(slower).unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    let after_reload = engine.get_snapshots(None).len();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(engine.get_snapshots(None).len(), after_reload);
    engine.stop();

    let mut saw_config_update = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, TelemetryEvent::ConfigUpdated) {
            saw_config_update = true;
        }
    }
    assert!(saw_config_update);
}

fn report_count(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("performance-report-"))
        .count()
}

#[tokio::test]
async fn test_auto_export_writes_reports_until_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let config = TelemetryConfig {
        auto_export: true,
        auto_export_interval_secs: 1,
        ..fast_config(dir.path())
    };
    let engine = engine(config, 64.0, 1024.0);

    engine.start().unwrap();
    tokio::time::sleep(Duration::from_millis(1_300)).await;
    engine.stop();
    assert_eq!(report_count(dir.path()), 1);

    // The export timer dies with the engine
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert_eq!(report_count(dir.path()), 1);
}

#[tokio::test]
async fn test_auto_export_follows_config_updates() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(fast_config(dir.path()), 64.0, 1024.0);

    engine.start().unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(report_count(dir.path()), 0);

    let exporting = TelemetryConfig {
        auto_export: true,
        auto_export_interval_secs: 1,
        ..engine.config()
    };
    engine.update_config(exporting.clone()).unwrap();
    tokio::time::sleep(Duration::from_millis(1_300)).await;
    assert_eq!(report_count(dir.path()), 1);

    engine
        .update_config(TelemetryConfig {
            auto_export: false,
            ..exporting
        })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert_eq!(report_count(dir.path()), 1);
    engine.stop();
}

#[test]
fn test_manual_sampling_without_loop() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(fast_config(dir.path()), 64.0, 1024.0);

    for _ in 0..3 {
        tokio_test::block_on(engine.sample_now());
    }

    let growth = engine.analyze_growth(ProcessKind::Primary, None);
    assert_eq!(growth.sample_count, 3);
    assert_eq!(growth.trend_direction, TrendDirection::Stable);
    assert!(!growth.is_leaking);
    assert!(engine.detect_leak_pattern().is_none());
    assert_eq!(engine.get_metric_history("heap_used_mb", Some(2)).len(), 2);
}

#[test]
fn test_engine_from_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[telemetry]
sampling_interval_ms = 500
history_size = 120
leak_growth_threshold_mb_per_min = 2.5

[telemetry.thresholds.fps]
warning = 50.0
critical = 35.0

[logging]
log_dir = "var/log"
rotation = "hourly"
cleanup_days = 7
"#,
    )
    .unwrap();

    let config = HeapwatchConfig::from_toml(&path).unwrap();
    assert_eq!(config.log_cleanup_days, 7);
    assert_eq!(config.logging.log_dir, "var/log");

    let engine = engine(config.telemetry, 64.0, 1024.0);
    let status = engine.get_status();
    assert_eq!(status.config.history_size, 120);
    assert_eq!(status.config.thresholds.fps.critical, 35.0);
    assert_eq!(status.config.thresholds.memory_percent.warning, 70.0);
    assert!(!status.running);
}

#[test]
fn test_shipped_config_matches_defaults() {
    let config = HeapwatchConfig::from_toml(concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml")).unwrap();
    assert_eq!(config.telemetry, TelemetryConfig::default());
    assert_eq!(config.log_cleanup_days, 30);
}
