//! Severity-graded alert log
//!
//! [`AlertManager`] stamps alerts with an id and timestamp, keeps the most recent
//! `capacity` of them and republishes each on the event bus.
//! [`AlertThrottle`] suppresses repeats of the same alert key within a cooldown.

use crate::bottleneck::Severity;
use crate::events::{EventBus, TelemetryEvent};
use crate::memory::{LeakPattern, ProcessKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    ThresholdExceeded,
    LeakDetected,
    OomRisk,
}

/// Alert contents before the manager assigns id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub current_value: f64,
    pub threshold: Option<f64>,
    pub process_kind: ProcessKind,
    pub process_id: Option<String>,
    pub leak_pattern: Option<LeakPattern>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: u64,
    /// Unix epoch milliseconds
    pub timestamp: i64,
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub current_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    pub process_kind: ProcessKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leak_pattern: Option<LeakPattern>,
}

#[derive(Debug)]
pub struct AlertManager {
    log: VecDeque<Alert>,
    capacity: usize,
    next_id: u64,
    events: EventBus,
}

impl AlertManager {
    pub fn new(capacity: usize, events: EventBus) -> Self {
        Self {
            log: VecDeque::new(),
            capacity: capacity.max(1),
            next_id: 1,
            events,
        }
    }

    pub fn emit(&mut self, alert: NewAlert, timestamp: i64) -> Alert {
        let alert = Alert {
            id: self.next_id,
            timestamp,
            kind: alert.kind,
            severity: alert.severity,
            message: alert.message,
            current_value: alert.current_value,
            threshold: alert.threshold,
            process_kind: alert.process_kind,
            process_id: alert.process_id,
            leak_pattern: alert.leak_pattern,
        };
        self.next_id += 1;

        match alert.severity {
            Severity::Critical => error!(kind = ?alert.kind, id = alert.id, "🚨 {}", alert.message),
            Severity::Warning => warn!(kind = ?alert.kind, id = alert.id, "⚠️ {}", alert.message),
        }

        self.log.push_back(alert.clone());
        while self.log.len() > self.capacity {
            self.log.pop_front();
        }

        self.events.publish(TelemetryEvent::Alert(alert.clone()));
        alert
    }

    /// Most recent `count` alerts, newest first
    pub fn recent(&self, count: usize) -> Vec<Alert> {
        self.log.iter().rev().take(count).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.log.len() > self.capacity {
            self.log.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.log.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ThrottleKey {
    process_id: String,
    topic: String,
}

#[derive(Debug, Clone, Copy)]
struct Fired {
    at_ms: i64,
    level: u8,
}

/// Per-process, per-topic cooldown for repeated alerts.
///
/// A repeat within the cooldown is suppressed unless its level is higher than
/// the level that last fired, so an escalation always gets through.
#[derive(Debug, Default)]
pub struct AlertThrottle {
    last_fired: HashMap<ThrottleKey, Fired>,
}

impl AlertThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true and records the firing if the alert should be emitted
    pub fn should_fire(&mut self, process_id: &str, topic: &str, level: u8, now_ms: i64, cooldown_ms: i64) -> bool {
        let key = ThrottleKey {
            process_id: process_id.to_string(),
            topic: topic.to_string(),
        };
        if let Some(last) = self.last_fired.get(&key) {
            if now_ms - last.at_ms < cooldown_ms && level <= last.level {
                return false;
            }
        }
        self.last_fired.insert(key, Fired { at_ms: now_ms, level });
        true
    }

    /// Drop every cooldown held for `process_id`
    pub fn forget_process(&mut self, process_id: &str) -> usize {
        let before = self.last_fired.len();
        self.last_fired.retain(|key, _| key.process_id != process_id);
        before - self.last_fired.len()
    }

    pub fn len(&self) -> usize {
        self.last_fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_fired.is_empty()
    }

    pub fn clear(&mut self) {
        self.last_fired.clear();
    }
}
