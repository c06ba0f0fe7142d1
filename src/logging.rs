//! Logging configuration for dual output (console + file) with rotation
//!
//! Telemetry runs inside a host application for hours at a time, so alerts and
//! collection failures go both to the console and to rotating log files.

use tracing_appender::non_blocking;
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

const LOG_FILE_PREFIX: &str = "heapwatch";

/// Logging configuration options
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory to store log files
    pub log_dir: String,
    /// Log level filter (e.g., "info", "heapwatch=debug")
    pub level_filter: String,
    pub rotation: LogRotation,
    /// Whether to include timestamps in console output
    pub console_timestamps: bool,
    /// Whether to use JSON format for file logs (structured)
    pub file_json_format: bool,
}

/// Log rotation configuration
#[derive(Debug, Clone)]
pub enum LogRotation {
    Daily,
    Hourly,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            level_filter: "info,heapwatch=info".to_string(),
            rotation: LogRotation::Daily,
            console_timestamps: true,
            file_json_format: true,
        }
    }
}

/// Initialize dual output logging (console + rotating files)
///
/// Console output is human-readable, file output is JSON unless disabled.
/// Returns a guard that must be kept alive for the duration of the application
/// so the background writer keeps flushing.
pub fn init_dual_logging(
    config: LoggingConfig,
) -> Result<tracing_appender::non_blocking::WorkerGuard, Box<dyn std::error::Error + Send + Sync>> {
    std::fs::create_dir_all(&config.log_dir)?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level_filter));
    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level_filter));

    let file_name = format!("{}.log", LOG_FILE_PREFIX);
    let file_appender = match config.rotation {
        LogRotation::Daily => tracing_appender::rolling::daily(&config.log_dir, &file_name),
        LogRotation::Hourly => tracing_appender::rolling::hourly(&config.log_dir, &file_name),
    };

    let (file_writer, guard) = non_blocking(file_appender);

    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_level(true)
        .with_target(true)
        .with_timer(if config.console_timestamps {
            ChronoUtc::new("%Y-%m-%d %H:%M:%S%.3f UTC".to_string())
        } else {
            ChronoUtc::new("".to_string())
        })
        .with_filter(console_filter);

    let file_layer = if config.file_json_format {
        fmt::layer()
            .json()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_level(true)
            .with_target(true)
            .with_thread_names(true)
            .with_timer(ChronoUtc::new("%Y-%m-%dT%H:%M:%S%.3fZ".to_string()))
            .with_filter(file_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_level(true)
            .with_target(true)
            .with_thread_names(true)
            .with_timer(ChronoUtc::new("%Y-%m-%d %H:%M:%S%.3f UTC".to_string()))
            .with_filter(file_filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::info!(
        log_dir = %config.log_dir,
        rotation = ?config.rotation,
        json_format = config.file_json_format,
        "📁 Dual logging initialized - console + rotating files"
    );

    Ok(guard)
}

/// Initialize simple logging for testing or minimal setups
pub fn init_simple_logging() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,heapwatch=info")))
        .try_init()?;

    tracing::info!("🖥️ Simple console logging initialized");
    Ok(())
}

/// List heapwatch log files in a directory, sorted by name
pub fn get_current_log_files(log_dir: &str) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();

    if let Ok(entries) = std::fs::read_dir(log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && is_heapwatch_log(&path) {
                files.push(path);
            }
        }
    }

    files.sort();
    files
}

/// Remove heapwatch log files last modified more than `keep_days` ago
pub fn cleanup_old_logs(log_dir: &str, keep_days: u32) -> Result<usize, std::io::Error> {
    let cutoff_time =
        std::time::SystemTime::now() - std::time::Duration::from_secs(keep_days as u64 * 24 * 3600);

    let mut removed_count = 0;

    for path in get_current_log_files(log_dir) {
        let modified = path.metadata().and_then(|m| m.modified());
        if let Ok(modified) = modified {
            if modified < cutoff_time && std::fs::remove_file(&path).is_ok() {
                removed_count += 1;
                tracing::debug!("🗑️ Removed old log file: {:?}", path);
            }
        }
    }

    if removed_count > 0 {
        tracing::info!(
            "🧹 Cleaned up {} old log files (older than {} days)",
            removed_count,
            keep_days
        );
    }

    Ok(removed_count)
}

// Rolling appenders name files "heapwatch.log.YYYY-MM-DD[-HH]"
fn is_heapwatch_log(path: &std::path::Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with(LOG_FILE_PREFIX) && name.contains(".log"))
        .unwrap_or(false)
}

/// Log basic environment information for debugging
pub fn log_system_info() {
    tracing::info!(
        package_version = env!("CARGO_PKG_VERSION"),
        target_arch = std::env::consts::ARCH,
        target_os = std::env::consts::OS,
        pid = std::process::id(),
        "📊 Environment information logged"
    );
}
