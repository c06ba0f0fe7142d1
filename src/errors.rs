use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to callers of the telemetry engine.
///
/// Recording and collection paths never return these; they log and carry on.
/// Only configuration loading/validation and report export propagate.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to persist report file: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("Telemetry engine must be started inside a Tokio runtime: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),
}

impl TelemetryError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TelemetryError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Per-source collection failures. Isolated to the source that produced them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollectionError {
    #[error("Surface destroyed: {0}")]
    SurfaceDestroyed(String),
    #[error("Remote evaluation unsupported on surface: {0}")]
    Unsupported(String),
    #[error("Surface {surface} did not answer within {timeout:?}")]
    Timeout { surface: String, timeout: Duration },
    #[error("Remote evaluation failed: {0}")]
    Evaluation(String),
    #[error("Process resource usage unavailable: {0}")]
    ResourceUnavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelemetryError::io("/tmp/report.json", std::io::Error::other("disk full"));
        assert_eq!(err.to_string(), "IO error at /tmp/report.json: disk full");

        let err = CollectionError::Timeout {
            surface: "overlay".to_string(),
            timeout: Duration::from_millis(500),
        };
        assert!(err.to_string().contains("overlay"));
        assert!(err.to_string().contains("500ms"));
    }
}
