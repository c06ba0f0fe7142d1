//! Heuristic leak pattern classification
//!
//! Only consulted once growth analysis has flagged a leak. Checks run in priority
//! order: listener counts, timer counts, then growth-rate bands.

use super::GrowthAnalysis;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const LISTENER_THRESHOLD: u64 = 100;
const LISTENER_CRITICAL: u64 = 500;
const TIMER_THRESHOLD: u64 = 50;
const TIMER_CRITICAL: u64 = 100;
const UNBOUNDED_CACHE_RATE: f64 = 10.0;
const CLOSURE_RETENTION_RATE: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeakPattern {
    ListenerAccumulation,
    TimerAccumulation,
    UnboundedCache,
    ClosureRetention,
    Unknown,
}

impl LeakPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeakPattern::ListenerAccumulation => "listener-accumulation",
            LeakPattern::TimerAccumulation => "timer-accumulation",
            LeakPattern::UnboundedCache => "unbounded-cache",
            LeakPattern::ClosureRetention => "closure-retention",
            LeakPattern::Unknown => "unknown",
        }
    }

    pub fn remediation(&self) -> &'static str {
        match self {
            LeakPattern::ListenerAccumulation => {
                "Event listeners keep accumulating. Remove listeners when their owner is torn down and avoid registering inside repeated code paths."
            }
            LeakPattern::TimerAccumulation => {
                "Active timers keep accumulating. Clear intervals and timeouts when the component that created them goes away."
            }
            LeakPattern::UnboundedCache => {
                "Memory grows quickly and steadily. Bound in-memory caches with a size limit or LRU eviction."
            }
            LeakPattern::ClosureRetention => {
                "Memory grows slowly and steadily. Look for closures or callbacks retaining large objects after use."
            }
            LeakPattern::Unknown => {
                "Memory grows without a recognisable pattern. Compare heap snapshots taken a few minutes apart."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeakSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakPatternMatch {
    pub pattern: LeakPattern,
    pub severity: LeakSeverity,
    pub remediation: String,
    pub growth_rate_mb_per_minute: f64,
    pub listener_count: u64,
    pub active_timer_count: u64,
}

/// Auxiliary counters reported by the host application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeakCounters {
    listeners: BTreeMap<String, u64>,
    active_timers: u64,
}

impl LeakCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listener count reported by one source (replaces its previous value)
    pub fn set_listener_count(&mut self, source: &str, count: u64) {
        if count == 0 {
            self.listeners.remove(source);
        } else {
            self.listeners.insert(source.to_string(), count);
        }
    }

    pub fn set_active_timers(&mut self, count: u64) {
        self.active_timers = count;
    }

    pub fn total_listeners(&self) -> u64 {
        self.listeners.values().sum()
    }

    pub fn active_timers(&self) -> u64 {
        self.active_timers
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
        self.active_timers = 0;
    }
}

/// Classify a leak. Returns `None` when the analysis does not report one.
pub fn classify_leak(analysis: &GrowthAnalysis, counters: &LeakCounters) -> Option<LeakPatternMatch> {
    if !analysis.is_leaking {
        return None;
    }

    let listeners = counters.total_listeners();
    let timers = counters.active_timers();
    let rate = analysis.growth_rate_mb_per_minute;

    let (pattern, severity) = if listeners > LISTENER_THRESHOLD {
        let severity = if listeners > LISTENER_CRITICAL {
            LeakSeverity::Critical
        } else {
            LeakSeverity::High
        };
        (LeakPattern::ListenerAccumulation, severity)
    } else if timers > TIMER_THRESHOLD {
        let severity = if timers > TIMER_CRITICAL {
            LeakSeverity::Critical
        } else {
            LeakSeverity::High
        };
        (LeakPattern::TimerAccumulation, severity)
    } else if rate > UNBOUNDED_CACHE_RATE {
        (LeakPattern::UnboundedCache, LeakSeverity::Critical)
    } else if rate > CLOSURE_RETENTION_RATE {
        (LeakPattern::ClosureRetention, LeakSeverity::Medium)
    } else {
        (LeakPattern::Unknown, LeakSeverity::Low)
    };

    Some(LeakPatternMatch {
        pattern,
        severity,
        remediation: pattern.remediation().to_string(),
        growth_rate_mb_per_minute: rate,
        listener_count: listeners,
        active_timer_count: timers,
    })
}
