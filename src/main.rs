use heapwatch::config::HeapwatchConfig;
use heapwatch::events::TelemetryEvent;
use heapwatch::logging::{cleanup_old_logs, init_dual_logging, init_simple_logging, log_system_info};
use heapwatch::TelemetryEngine;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());

    // Pre-load configuration to get logging settings
    let config = match HeapwatchConfig::from_toml(&config_path) {
        Ok(config) => {
            // Simple print until logging is initialized
            println!("✅ Loaded configuration from {}", config_path);
            config
        }
        Err(e) => {
            println!("⚠️ Failed to load {}: {}. Using default configuration", config_path, e);
            HeapwatchConfig::default()
        }
    };

    // Initialize dual logging system (console + rotating files)
    let _logging_guard = match init_dual_logging(config.logging.clone()) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("❌ Failed to initialize logging system: {}", e);
            if let Err(fallback) = init_simple_logging() {
                eprintln!("❌ Fallback logging failed too: {}", fallback);
            }
            error!("⚠️ Using fallback console-only logging due to error: {}", e);
            None
        }
    };

    if let Err(e) = cleanup_old_logs(&config.logging.log_dir, config.log_cleanup_days) {
        warn!("⚠️ Failed to clean up old log files: {}", e);
    }

    log_system_info();

    let telemetry = &config.telemetry;
    info!(
        sampling_interval_ms = telemetry.sampling_interval_ms,
        history_size = telemetry.history_size,
        analysis_window_minutes = telemetry.analysis_window_minutes,
        leak_threshold = telemetry.leak_growth_threshold_mb_per_min,
        auto_export = telemetry.auto_export,
        export_dir = %telemetry.export_dir.display(),
        log_dir = %config.logging.log_dir,
        "🔧 Telemetry configuration logged"
    );

    let engine = match TelemetryEngine::new(config.telemetry.clone()) {
        Ok(engine) => engine,
        Err(e) => {
            error!("❌ Invalid telemetry configuration: {}", e);
            std::process::exit(1);
        }
    };

    let mut events = engine.subscribe();
    let alert_logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(TelemetryEvent::Alert(alert)) => {
                    info!(
                        id = alert.id,
                        kind = ?alert.kind,
                        severity = ?alert.severity,
                        value = alert.current_value,
                        "🔔 {}",
                        alert.message
                    );
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("⚠️ Alert logger lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    if let Err(e) = engine.start() {
        error!("❌ Failed to start telemetry engine: {}", e);
        std::process::exit(1);
    }

    info!("👀 Watching process {} (Ctrl-C to stop)", std::process::id());
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("❌ Failed to listen for Ctrl-C: {}", e);
    }

    engine.stop();
    match engine.export_report(None) {
        Ok(path) => info!("✅ Final report written to {}", path.display()),
        Err(e) => error!("❌ Failed to export final report: {}", e),
    }

    let status = engine.get_status();
    info!(
        snapshots = status.snapshot_count,
        alerts = status.alert_count,
        "🏁 heapwatch shutting down"
    );

    alert_logger.abort();
}
