//! Hot-reloadable telemetry configuration
//!
//! Loaded from the `[telemetry]` section of `config.toml`. Every field has a
//! default so a partial (or missing) section still yields a usable config.

use crate::errors::TelemetryError;
use crate::logging::{LogRotation, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Which side of a threshold pair is the bad side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdDirection {
    /// Values above the threshold are bad (CPU, memory, latency)
    Above,
    /// Values below the threshold are bad (frame rate)
    Below,
}

/// Warning/critical pair for a single dimension
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPair {
    pub warning: f64,
    pub critical: f64,
}

impl ThresholdPair {
    pub const fn new(warning: f64, critical: f64) -> Self {
        Self { warning, critical }
    }

    fn is_ordered(&self, direction: ThresholdDirection) -> bool {
        match direction {
            ThresholdDirection::Above => self.warning <= self.critical,
            ThresholdDirection::Below => self.warning >= self.critical,
        }
    }
}

/// Threshold table consulted by the bottleneck detector and alerting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdTable {
    pub fps: ThresholdPair,
    pub memory_percent: ThresholdPair,
    pub cpu_percent: ThresholdPair,
    pub ipc_latency_ms: ThresholdPair,
    pub frame_time_ms: ThresholdPair,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            fps: ThresholdPair::new(45.0, 30.0),
            memory_percent: ThresholdPair::new(70.0, 90.0),
            cpu_percent: ThresholdPair::new(70.0, 90.0),
            ipc_latency_ms: ThresholdPair::new(50.0, 100.0),
            frame_time_ms: ThresholdPair::new(22.0, 33.0),
        }
    }
}

/// Engine configuration. All fields may be swapped at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Sampling tick period in milliseconds
    pub sampling_interval_ms: u64,
    /// Capacity of every metric history and memory sample ring buffer
    pub history_size: usize,
    /// Capacity of the snapshot ring buffer
    pub max_snapshots: usize,
    /// Capacity of the alert log
    pub alert_capacity: usize,
    pub thresholds: ThresholdTable,
    /// Minimum heap growth (MB/min) that counts as a leak
    pub leak_growth_threshold_mb_per_min: f64,
    /// Regression window for growth analysis
    pub analysis_window_minutes: u64,
    pub auto_export: bool,
    pub auto_export_interval_secs: u64,
    /// Directory receiving exported reports
    pub export_dir: PathBuf,
    /// Collect heap numbers from auxiliary surfaces each tick
    pub collect_auxiliary: bool,
    /// Upper bound on a single remote evaluation (further capped by the sampling interval)
    pub auxiliary_timeout_ms: u64,
    /// Suppression period for repeated alerts on the same dimension
    pub alert_cooldown_secs: u64,
    /// Heap usage (% of limit) that raises an OOM-risk alert
    pub oom_risk_percent: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            sampling_interval_ms: 1000,
            history_size: 300,
            max_snapshots: 300,
            alert_capacity: 100,
            thresholds: ThresholdTable::default(),
            leak_growth_threshold_mb_per_min: 1.0,
            analysis_window_minutes: 5,
            auto_export: false,
            auto_export_interval_secs: 300,
            export_dir: PathBuf::from("telemetry"),
            collect_auxiliary: true,
            auxiliary_timeout_ms: 1000,
            alert_cooldown_secs: 30,
            oom_risk_percent: 90.0,
        }
    }
}

impl TelemetryConfig {
    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.sampling_interval_ms)
    }

    /// Remote evaluation timeout, never longer than one sampling tick
    pub fn auxiliary_timeout(&self) -> Duration {
        Duration::from_millis(self.auxiliary_timeout_ms.min(self.sampling_interval_ms))
    }

    pub fn auto_export_interval(&self) -> Duration {
        Duration::from_secs(self.auto_export_interval_secs)
    }

    pub fn alert_cooldown_ms(&self) -> i64 {
        (self.alert_cooldown_secs as i64).saturating_mul(1000)
    }

    pub fn analysis_window(&self) -> Duration {
        Duration::from_secs(self.analysis_window_minutes.saturating_mul(60))
    }

    pub fn analysis_window_ms(&self) -> i64 {
        (self.analysis_window_minutes as i64).saturating_mul(60_000)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<(), TelemetryError> {
        if self.sampling_interval_ms < 10 {
            return Err(TelemetryError::InvalidConfig(format!(
                "sampling_interval_ms must be at least 10, got {}",
                self.sampling_interval_ms
            )));
        }
        if self.history_size == 0 || self.max_snapshots == 0 || self.alert_capacity == 0 {
            return Err(TelemetryError::InvalidConfig(
                "history_size, max_snapshots and alert_capacity must be non-zero".to_string(),
            ));
        }
        if self.analysis_window_minutes == 0 {
            return Err(TelemetryError::InvalidConfig(
                "analysis_window_minutes must be non-zero".to_string(),
            ));
        }
        if self.auto_export && self.auto_export_interval_secs == 0 {
            return Err(TelemetryError::InvalidConfig(
                "auto_export_interval_secs must be non-zero when auto_export is enabled".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.oom_risk_percent) {
            return Err(TelemetryError::InvalidConfig(format!(
                "oom_risk_percent must be within 0..=100, got {}",
                self.oom_risk_percent
            )));
        }

        let t = &self.thresholds;
        let pairs = [
            ("fps", t.fps, ThresholdDirection::Below),
            ("memory_percent", t.memory_percent, ThresholdDirection::Above),
            ("cpu_percent", t.cpu_percent, ThresholdDirection::Above),
            ("ipc_latency_ms", t.ipc_latency_ms, ThresholdDirection::Above),
            ("frame_time_ms", t.frame_time_ms, ThresholdDirection::Above),
        ];
        for (name, pair, direction) in pairs {
            if !pair.is_ordered(direction) {
                return Err(TelemetryError::InvalidConfig(format!(
                    "threshold {} has warning {} and critical {} in the wrong order",
                    name, pair.warning, pair.critical
                )));
            }
        }

        Ok(())
    }
}

/// Logging configuration from config.toml
#[derive(Debug, Clone, Default, Deserialize)]
struct LoggingTomlConfig {
    pub log_dir: Option<String>,
    pub level_filter: Option<String>,
    pub rotation: Option<String>, // "daily" or "hourly"
    pub console_timestamps: Option<bool>,
    pub file_json_format: Option<bool>,
    pub cleanup_days: Option<u32>,
}

/// Full TOML configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
struct TomlConfig {
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    pub logging: Option<LoggingTomlConfig>,
}

/// Process-level configuration (converted from TOML)
#[derive(Debug, Clone)]
pub struct HeapwatchConfig {
    pub telemetry: TelemetryConfig,
    pub logging: LoggingConfig,
    pub log_cleanup_days: u32,
}

impl Default for HeapwatchConfig {
    fn default() -> Self {
        Self {
            telemetry: TelemetryConfig::default(),
            logging: LoggingConfig::default(),
            log_cleanup_days: 30,
        }
    }
}

impl HeapwatchConfig {
    /// Load configuration from a config.toml file
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self, TelemetryError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| TelemetryError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, TelemetryError> {
        let toml_config: TomlConfig = toml::from_str(content)?;
        toml_config.telemetry.validate()?;
        Ok(Self::from_toml_config(toml_config))
    }

    fn from_toml_config(toml_config: TomlConfig) -> Self {
        let log_config = toml_config.logging.unwrap_or_default();
        let defaults = LoggingConfig::default();

        let rotation = match log_config.rotation.as_deref() {
            Some("hourly") => LogRotation::Hourly,
            Some("daily") | None => LogRotation::Daily,
            Some(other) => {
                debug!("Unknown log rotation '{}', using daily", other);
                LogRotation::Daily
            }
        };

        let logging = LoggingConfig {
            log_dir: log_config.log_dir.unwrap_or(defaults.log_dir),
            level_filter: log_config.level_filter.unwrap_or(defaults.level_filter),
            rotation,
            console_timestamps: log_config.console_timestamps.unwrap_or(defaults.console_timestamps),
            file_json_format: log_config.file_json_format.unwrap_or(defaults.file_json_format),
        };

        Self {
            telemetry: toml_config.telemetry,
            logging,
            log_cleanup_days: log_config.cleanup_days.unwrap_or(30),
        }
    }
}
