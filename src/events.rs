//! Outbound telemetry events
//!
//! Subscribers receive events over a `tokio::sync::broadcast` channel. Within a
//! sampling tick, `Metric` events are sent before the tick's `Snapshot`.

use crate::alerts::Alert;
use crate::sampler::Snapshot;
use crate::timing::{CompletedTiming, RenderMetrics};
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum TelemetryEvent {
    Metric {
        name: String,
        value: f64,
        timestamp: i64,
    },
    IpcComplete(CompletedTiming),
    VoiceTiming {
        stage: String,
        duration_ms: f64,
    },
    RenderMetrics(RenderMetrics),
    Snapshot(Box<Snapshot>),
    Alert(Alert),
    Started,
    Stopped,
    ReportExported {
        path: PathBuf,
    },
    ConfigUpdated,
    Reset,
}

impl TelemetryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TelemetryEvent::Metric { .. } => "metric",
            TelemetryEvent::IpcComplete(_) => "ipc-complete",
            TelemetryEvent::VoiceTiming { .. } => "voice-timing",
            TelemetryEvent::RenderMetrics(_) => "render-metrics",
            TelemetryEvent::Snapshot(_) => "snapshot",
            TelemetryEvent::Alert(_) => "alert",
            TelemetryEvent::Started => "started",
            TelemetryEvent::Stopped => "stopped",
            TelemetryEvent::ReportExported { .. } => "report-exported",
            TelemetryEvent::ConfigUpdated => "config-updated",
            TelemetryEvent::Reset => "reset",
        }
    }
}

/// Fan-out publisher for telemetry events
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TelemetryEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: TelemetryEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish(TelemetryEvent::Started);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(TelemetryEvent::Metric {
            name: "fps".to_string(),
            value: 60.0,
            timestamp: 1,
        });
        bus.publish(TelemetryEvent::Reset);

        assert_eq!(rx.recv().await.unwrap().name(), "metric");
        assert_eq!(rx.recv().await.unwrap().name(), "reset");
    }

    #[test]
    fn test_event_serialization_tag() {
        let json = serde_json::to_value(TelemetryEvent::VoiceTiming {
            stage: "stt".to_string(),
            duration_ms: 120.0,
        })
        .unwrap();
        assert_eq!(json["event"], "voice-timing");
        assert_eq!(json["stage"], "stt");
    }
}
