//! IPC / operation timing
//!
//! Pairs `start` and `end` calls keyed by `(channel, request_id)` into durations
//! and feeds them into the metric store. Also holds the latest voice-stage and
//! render figures pushed by the host application.

use crate::metrics::{self, MetricStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TimingKey {
    channel: String,
    request_id: String,
}

/// In-flight timing, consumed by the matching `end`
#[derive(Debug, Clone)]
pub struct PendingTiming {
    pub channel: String,
    pub start_time: Instant,
    pub end_time: Option<Instant>,
    pub duration_ms: Option<f64>,
    pub success: bool,
    pub error: Option<String>,
}

/// Result of a matched start/end pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTiming {
    pub channel: String,
    pub request_id: String,
    pub duration_ms: f64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregates for one channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub count: u64,
    pub errors: u64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
    #[serde(skip)]
    total_latency_ms: f64,
}

impl ChannelStats {
    fn record(&mut self, duration_ms: f64, success: bool) {
        self.count += 1;
        if !success {
            self.errors += 1;
        }
        self.total_latency_ms += duration_ms;
        self.avg_latency_ms = self.total_latency_ms / self.count as f64;
        self.max_latency_ms = self.max_latency_ms.max(duration_ms);
    }
}

/// IPC section of a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpcSummary {
    pub total_messages: u64,
    pub total_errors: u64,
    pub pending: usize,
    pub avg_latency_ms: f64,
    pub channels: BTreeMap<String, ChannelStats>,
}

#[derive(Debug, Default)]
pub struct IpcTimingTracker {
    pending: HashMap<TimingKey, PendingTiming>,
    channels: BTreeMap<String, ChannelStats>,
    message_count: u64,
    error_count: u64,
}

impl IpcTimingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin timing a request. A second start for the same key replaces the first.
    pub fn start_at(&mut self, channel: &str, request_id: &str, now: Instant) {
        let key = TimingKey {
            channel: channel.to_string(),
            request_id: request_id.to_string(),
        };
        let pending = PendingTiming {
            channel: channel.to_string(),
            start_time: now,
            end_time: None,
            duration_ms: None,
            success: false,
            error: None,
        };
        if self.pending.insert(key, pending).is_some() {
            debug!("Restarted timing for {}#{}", channel, request_id);
        }
    }

    /// Finish timing a request and record it.
    ///
    /// Returns `None` (after logging) when no matching start exists.
    pub fn end_at(
        &mut self,
        store: &mut MetricStore,
        channel: &str,
        request_id: &str,
        success: bool,
        error: Option<String>,
        now: Instant,
        timestamp: i64,
    ) -> Option<CompletedTiming> {
        let key = TimingKey {
            channel: channel.to_string(),
            request_id: request_id.to_string(),
        };
        let Some(mut pending) = self.pending.remove(&key) else {
            warn!("⚠️ No pending timing for {}#{}", channel, request_id);
            return None;
        };

        let duration_ms = now.saturating_duration_since(pending.start_time).as_secs_f64() * 1000.0;
        pending.end_time = Some(now);
        pending.duration_ms = Some(duration_ms);
        pending.success = success;
        pending.error = error;

        let mut metadata = HashMap::new();
        metadata.insert("channel".to_string(), channel.to_string());
        store.record(metrics::IPC_LATENCY, duration_ms, timestamp, Some(metadata));

        self.message_count += 1;
        store.record(metrics::IPC_MESSAGES, self.message_count as f64, timestamp, None);
        if !success {
            self.error_count += 1;
            store.record(metrics::IPC_ERRORS, self.error_count as f64, timestamp, None);
        }

        self.channels
            .entry(channel.to_string())
            .or_default()
            .record(duration_ms, success);

        Some(CompletedTiming {
            channel: pending.channel,
            request_id: request_id.to_string(),
            duration_ms,
            success,
            error: pending.error,
        })
    }

    /// Forget in-flight timings started before `cutoff`; returns how many were dropped
    pub fn prune_started_before(&mut self, cutoff: Instant) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, pending| pending.start_time >= cutoff);
        before - self.pending.len()
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn summary(&self) -> IpcSummary {
        let total_latency: f64 = self.channels.values().map(|c| c.total_latency_ms).sum();
        let completed: u64 = self.channels.values().map(|c| c.count).sum();
        IpcSummary {
            total_messages: self.message_count,
            total_errors: self.error_count,
            pending: self.pending.len(),
            avg_latency_ms: if completed > 0 {
                total_latency / completed as f64
            } else {
                0.0
            },
            channels: self.channels.clone(),
        }
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.channels.clear();
        self.message_count = 0;
        self.error_count = 0;
    }
}

/// Metric name for a voice pipeline stage, if the stage is known
pub fn voice_stage_metric(stage: &str) -> Option<&'static str> {
    match stage {
        "wake_word" | "wakeWord" => Some(metrics::VOICE_WAKE_WORD),
        "stt" => Some(metrics::VOICE_STT),
        "llm" => Some(metrics::VOICE_LLM),
        "tts" => Some(metrics::VOICE_TTS),
        "total" => Some(metrics::VOICE_TOTAL),
        _ => None,
    }
}

/// Latest duration per voice stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceTimings {
    pub stages: BTreeMap<String, f64>,
    pub updated_at: i64,
}

/// Render figures pushed by the UI surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderMetrics {
    pub fps: f64,
    pub frame_time_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropped_frames: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_end_without_start_is_noop() {
        let mut tracker = IpcTimingTracker::new();
        let mut store = MetricStore::new(10);

        let result = tracker.end_at(&mut store, "chat", "1", true, None, Instant::now(), 0);
        assert!(result.is_none());
        assert_eq!(tracker.message_count(), 0);
        assert!(store.history(metrics::IPC_LATENCY, None).is_empty());
    }

    #[test]
    fn test_start_end_duration() {
        let mut tracker = IpcTimingTracker::new();
        let mut store = MetricStore::new(10);
        let t0 = Instant::now();

        tracker.start_at("settings:get", "42", t0);
        assert_eq!(tracker.pending_count(), 1);

        let done = tracker
            .end_at(&mut store, "settings:get", "42", true, None, t0 + Duration::from_millis(37), 0)
            .unwrap();

        assert!((done.duration_ms - 37.0).abs() < 0.001);
        assert_eq!(tracker.message_count(), 1);
        assert_eq!(tracker.error_count(), 0);
        assert_eq!(tracker.pending_count(), 0);
        assert_eq!(store.current(metrics::IPC_LATENCY), Some(done.duration_ms));
        assert_eq!(store.current(metrics::IPC_MESSAGES), Some(1.0));
    }

    #[test]
    fn test_last_start_wins() {
        let mut tracker = IpcTimingTracker::new();
        let mut store = MetricStore::new(10);
        let t0 = Instant::now();

        tracker.start_at("chat", "r", t0);
        tracker.start_at("chat", "r", t0 + Duration::from_millis(20));
        assert_eq!(tracker.pending_count(), 1);

        let done = tracker
            .end_at(&mut store, "chat", "r", true, None, t0 + Duration::from_millis(30), 0)
            .unwrap();
        assert!((done.duration_ms - 10.0).abs() < 0.001);
    }

    #[test]
    fn test_failure_counts_error() {
        let mut tracker = IpcTimingTracker::new();
        let mut store = MetricStore::new(10);
        let t0 = Instant::now();

        tracker.start_at("files:read", "a", t0);
        tracker.start_at("files:read", "b", t0);
        tracker.end_at(&mut store, "files:read", "a", false, Some("ENOENT".into()), t0 + Duration::from_millis(5), 0);
        tracker.end_at(&mut store, "files:read", "b", true, None, t0 + Duration::from_millis(15), 0);

        let summary = tracker.summary();
        assert_eq!(summary.total_messages, 2);
        assert_eq!(summary.total_errors, 1);
        let channel = &summary.channels["files:read"];
        assert_eq!(channel.count, 2);
        assert_eq!(channel.errors, 1);
        assert!((channel.avg_latency_ms - 10.0).abs() < 0.001);
        assert!((channel.max_latency_ms - 15.0).abs() < 0.001);
        assert_eq!(store.current(metrics::IPC_ERRORS), Some(1.0));
    }

    #[test]
    fn test_same_request_id_different_channels() {
        let mut tracker = IpcTimingTracker::new();
        let t0 = Instant::now();
        tracker.start_at("a", "1", t0);
        tracker.start_at("b", "1", t0);
        assert_eq!(tracker.pending_count(), 2);
    }

    #[test]
    fn test_prune_abandoned_starts() {
        let mut tracker = IpcTimingTracker::new();
        let t0 = Instant::now();
        tracker.start_at("chat", "old", t0);
        tracker.start_at("chat", "new", t0 + Duration::from_secs(90));

        assert_eq!(tracker.prune_started_before(t0 + Duration::from_secs(60)), 1);
        assert_eq!(tracker.pending_count(), 1);

        let mut store = MetricStore::new(10);
        assert!(tracker
            .end_at(&mut store, "chat", "old", true, None, t0 + Duration::from_secs(120), 0)
            .is_none());
        assert!(tracker
            .end_at(&mut store, "chat", "new", true, None, t0 + Duration::from_secs(120), 0)
            .is_some());
    }

    #[test]
    fn test_voice_stage_names() {
        assert_eq!(voice_stage_metric("stt"), Some(metrics::VOICE_STT));
        assert_eq!(voice_stage_metric("wakeWord"), Some(metrics::VOICE_WAKE_WORD));
        assert_eq!(voice_stage_metric("unknown"), None);
    }
}
