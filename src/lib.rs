//! Runtime performance and memory telemetry for multi-process desktop hosts.
//!
//! A [`TelemetryEngine`] samples the primary process on a fixed interval,
//! keeps bounded metric histories, flags threshold bottlenecks, collects heap
//! figures from auxiliary surfaces and fits linear trends over heap usage to
//! detect and classify memory leaks.

pub mod alerts;
pub mod bottleneck;
pub mod collector;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod logging;
pub mod memory;
pub mod metrics;
pub mod report;
pub mod resources;
pub mod sampler;
pub mod timing;

pub use alerts::{Alert, AlertKind};
pub use collector::{RemoteHeapEvaluator, RemoteHeapStats};
pub use config::{HeapwatchConfig, TelemetryConfig, ThresholdPair, ThresholdTable};
pub use engine::{EngineStatus, TelemetryEngine};
pub use errors::{CollectionError, TelemetryError};
pub use events::TelemetryEvent;
pub use memory::{GrowthAnalysis, LeakPattern, ProcessKind, TrendDirection};
pub use timing::RenderMetrics;
