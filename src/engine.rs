//! Telemetry engine
//!
//! An explicit instance owned by the host's composition root. Cloning a
//! [`TelemetryEngine`] hands out another handle to the same engine, so
//! collaborators can record metrics while the sampling loop runs.
//!
//! Each sampling tick reads the primary process, records metrics, detects
//! bottlenecks, stores a snapshot and raises threshold alerts. It then collects
//! heap figures from every auxiliary surface concurrently and runs growth
//! analysis over every process buffer. Metric events of a tick are always
//! published before that tick's snapshot event.

use crate::alerts::{Alert, AlertKind, AlertManager, AlertThrottle, NewAlert};
use crate::bottleneck::{self, detect_bottlenecks, Severity};
use crate::collector::{collect_all, RemoteHeapEvaluator, SurfaceRegistry};
use crate::config::{TelemetryConfig, ThresholdDirection};
use crate::errors::TelemetryError;
use crate::events::{EventBus, TelemetryEvent};
use crate::memory::{
    analyze_samples, classify_leak, GrowthAnalysis, LeakCounters, LeakPatternMatch, LeakSeverity,
    ProcessKind, ProcessMemorySample, SampleBuffers, PRIMARY_PROCESS_ID,
};
use crate::metrics::{self, DataPoint, MetricCategory, MetricStore, MetricSummary};
use crate::report::{self, Report};
use crate::resources::{self, bytes_to_mb, CpuTracker, ProcessResourceSource, ResourceUsage, SysinfoResourceSource};
use crate::sampler::{CpuSnapshot, MemorySnapshot, Snapshot, SnapshotBuffer};
use crate::timing::{self, IpcTimingTracker, RenderMetrics, VoiceTimings};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Engine state guarded by a single lock. Never held across an await.
struct EngineState {
    metrics: MetricStore,
    timings: IpcTimingTracker,
    samples: SampleBuffers,
    snapshots: SnapshotBuffer,
    alerts: AlertManager,
    throttle: AlertThrottle,
    counters: LeakCounters,
    cpu: CpuTracker,
    voice: Option<VoiceTimings>,
    render: Option<RenderMetrics>,
    started_at: Option<DateTime<Utc>>,
}

impl EngineState {
    fn new(config: &TelemetryConfig, events: EventBus) -> Self {
        Self {
            metrics: MetricStore::new(config.history_size),
            timings: IpcTimingTracker::new(),
            samples: SampleBuffers::new(config.history_size),
            snapshots: SnapshotBuffer::new(config.max_snapshots),
            alerts: AlertManager::new(config.alert_capacity, events),
            throttle: AlertThrottle::new(),
            counters: LeakCounters::new(),
            cpu: CpuTracker::new(),
            voice: None,
            render: None,
            started_at: None,
        }
    }

    /// Emit unless the same process and topic fired within `cooldown_ms` at an
    /// equal or higher `level`
    fn raise(
        &mut self,
        process_id: &str,
        topic: &str,
        level: u8,
        alert: NewAlert,
        now_ms: i64,
        cooldown_ms: i64,
    ) -> Option<Alert> {
        if !self.throttle.should_fire(process_id, topic, level, now_ms, cooldown_ms) {
            debug!("Alert {}:{} suppressed by cooldown", process_id, topic);
            return None;
        }
        Some(self.alerts.emit(alert, now_ms))
    }

    fn check_oom(&mut self, sample: &ProcessMemorySample, config: &TelemetryConfig, now_ms: i64) {
        let Some(percent) = resources::heap_percent(sample.heap_used, sample.heap_limit) else {
            return;
        };
        if percent < config.oom_risk_percent {
            return;
        }

        let alert = NewAlert {
            kind: AlertKind::OomRisk,
            severity: Severity::Critical,
            message: format!(
                "{} heap at {:.1}% of its {:.0} MB limit",
                sample.process_id,
                percent,
                bytes_to_mb(sample.heap_limit)
            ),
            current_value: percent,
            threshold: Some(config.oom_risk_percent),
            process_kind: sample.process_kind,
            process_id: Some(sample.process_id.clone()),
            leak_pattern: None,
        };
        self.raise(
            &sample.process_id,
            "oom",
            Severity::Critical as u8,
            alert,
            now_ms,
            config.alert_cooldown_ms(),
        );
    }

    /// Auxiliary surfaces only report heap, so only the memory pair applies
    fn check_auxiliary_thresholds(&mut self, sample: &ProcessMemorySample, config: &TelemetryConfig, now_ms: i64) {
        let Some(percent) = resources::heap_percent(sample.heap_used, sample.heap_limit) else {
            return;
        };
        let Some((severity, threshold)) = bottleneck::classify(
            percent,
            config.thresholds.memory_percent,
            ThresholdDirection::Above,
        ) else {
            return;
        };

        let alert = NewAlert {
            kind: AlertKind::ThresholdExceeded,
            severity,
            message: format!(
                "Surface {} heap usage {:.1}% is above the {:?} threshold of {:.1}%",
                sample.process_id, percent, severity, threshold
            ),
            current_value: percent,
            threshold: Some(threshold),
            process_kind: ProcessKind::Auxiliary,
            process_id: Some(sample.process_id.clone()),
            leak_pattern: None,
        };
        self.raise(
            &sample.process_id,
            "threshold:memory",
            severity as u8,
            alert,
            now_ms,
            config.alert_cooldown_ms(),
        );
    }

    fn analyze(&self, kind: ProcessKind, process_id: Option<&str>, config: &TelemetryConfig, now_ms: i64) -> GrowthAnalysis {
        match self.samples.select(kind, process_id) {
            Some(buffer) => analyze_samples(
                buffer,
                now_ms,
                config.analysis_window_minutes,
                config.leak_growth_threshold_mb_per_min,
            ),
            None => GrowthAnalysis::empty(config.analysis_window_minutes, 0),
        }
    }

    fn check_leaks(&mut self, config: &TelemetryConfig, now_ms: i64) {
        let ids: Vec<String> = self.samples.process_ids().cloned().collect();
        for id in ids {
            let Some(kind) = self.samples.latest(&id).map(|s| s.process_kind) else {
                continue;
            };
            let analysis = self.analyze(kind, Some(id.as_str()), config, now_ms);
            let Some(found) = classify_leak(&analysis, &self.counters) else {
                continue;
            };

            let severity = match found.severity {
                LeakSeverity::Critical | LeakSeverity::High => Severity::Critical,
                LeakSeverity::Medium | LeakSeverity::Low => Severity::Warning,
            };
            let alert = NewAlert {
                kind: AlertKind::LeakDetected,
                severity,
                message: format!(
                    "Possible {} leak in {}: heap growing {:.2} MB/min ({:.0}% confidence). {}",
                    found.pattern.as_str(),
                    id,
                    analysis.growth_rate_mb_per_minute,
                    analysis.confidence_score * 100.0,
                    found.remediation
                ),
                current_value: analysis.growth_rate_mb_per_minute,
                threshold: Some(config.leak_growth_threshold_mb_per_min),
                process_kind: kind,
                process_id: Some(id.clone()),
                leak_pattern: Some(found.pattern),
            };
            self.raise(&id, "leak", found.severity as u8, alert, now_ms, config.analysis_window_ms());
        }
    }

    fn resize(&mut self, config: &TelemetryConfig) {
        self.metrics.set_capacity(config.history_size);
        self.samples.set_capacity(config.history_size);
        self.snapshots.set_capacity(config.max_snapshots);
        self.alerts.set_capacity(config.alert_capacity);
    }
}

/// Background tasks of a running engine
struct RunningTasks {
    runtime: Handle,
    shutdown: watch::Sender<bool>,
    sampler: JoinHandle<()>,
    auto_export: Option<JoinHandle<()>>,
}

struct Inner {
    config: RwLock<TelemetryConfig>,
    state: Mutex<EngineState>,
    resource_source: Mutex<Box<dyn ProcessResourceSource>>,
    surfaces: Mutex<SurfaceRegistry>,
    events: EventBus,
    running: AtomicBool,
    /// Bumped on every start and stop; ticks from an older session are discarded
    session: AtomicU64,
    tasks: Mutex<Option<RunningTasks>>,
}

impl Inner {
    fn is_current(&self, session: Option<u64>) -> bool {
        match session {
            Some(session) => {
                self.running.load(Ordering::SeqCst) && self.session.load(Ordering::SeqCst) == session
            }
            None => true,
        }
    }

    async fn run_tick(&self, session: Option<u64>) {
        let config = self.config.read().clone();
        let now_ms = Utc::now().timestamp_millis();
        let now = Instant::now();

        let usage = match self.resource_source.lock().read_usage() {
            Ok(usage) => Some(usage),
            Err(e) => {
                warn!("⚠️ Skipping primary sample this tick: {}", e);
                None
            }
        };

        {
            let mut state = self.state.lock();
            if !self.is_current(session) {
                return;
            }
            if let Some(cutoff) = now.checked_sub(config.analysis_window()) {
                let dropped = state.timings.prune_started_before(cutoff);
                if dropped > 0 {
                    debug!("Dropped {} timings that never completed", dropped);
                }
            }
            if let Some(usage) = usage {
                self.sample_primary(&mut state, &config, usage, now, now_ms);
            }
        }

        if config.collect_auxiliary {
            self.collect_auxiliary(&config, session, now_ms).await;
        }

        let mut state = self.state.lock();
        if !self.is_current(session) {
            return;
        }
        state.check_leaks(&config, now_ms);
    }

    fn sample_primary(
        &self,
        state: &mut EngineState,
        config: &TelemetryConfig,
        usage: ResourceUsage,
        now: Instant,
        now_ms: i64,
    ) {
        let cpu_percent = state.cpu.sample(usage.cpu_time_ms, now);
        let memory = MemorySnapshot::from(&usage);

        let mut recorded = vec![
            (metrics::HEAP_USED, memory.heap_used_mb),
            (metrics::HEAP_TOTAL, memory.heap_total_mb),
            (metrics::RSS, memory.rss_mb),
            (metrics::EXTERNAL_MEMORY, memory.external_mb),
            (metrics::CPU_PERCENT, cpu_percent),
        ];
        if let Some(percent) = memory.heap_percent {
            recorded.push((metrics::HEAP_PERCENT, percent));
        }
        for (name, value) in recorded {
            if state.metrics.record(name, value, now_ms, None) {
                self.publish_metric(name, value, now_ms);
            }
        }

        let sample = ProcessMemorySample {
            timestamp: now_ms,
            process_id: PRIMARY_PROCESS_ID.to_string(),
            process_kind: ProcessKind::Primary,
            heap_used: usage.heap_used_bytes,
            heap_total: usage.heap_total_bytes,
            heap_limit: usage.heap_limit_bytes,
            resident_set_size: usage.rss_bytes,
            external_memory: usage.external_bytes,
        };
        state.samples.push(sample.clone());

        let bottlenecks = detect_bottlenecks(&state.metrics, &config.thresholds);
        let snapshot = Snapshot {
            timestamp: now_ms,
            memory,
            cpu: CpuSnapshot {
                percent: cpu_percent,
                cpu_time_ms: usage.cpu_time_ms,
            },
            ipc_summary: state.timings.summary(),
            voice_timings: state.voice.clone(),
            render_metrics: state.render.clone(),
            bottlenecks: bottlenecks.clone(),
        };
        state.snapshots.push(snapshot.clone());
        self.events.publish(TelemetryEvent::Snapshot(Box::new(snapshot)));

        for found in bottlenecks {
            let topic = format!("threshold:{}", found.kind.as_str());
            let level = found.severity as u8;
            let alert = NewAlert {
                kind: AlertKind::ThresholdExceeded,
                severity: found.severity,
                message: found.description,
                current_value: found.value,
                threshold: Some(found.threshold),
                process_kind: ProcessKind::Primary,
                process_id: None,
                leak_pattern: None,
            };
            state.raise(PRIMARY_PROCESS_ID, &topic, level, alert, now_ms, config.alert_cooldown_ms());
        }

        state.check_oom(&sample, config, now_ms);
    }

    async fn collect_auxiliary(&self, config: &TelemetryConfig, session: Option<u64>, now_ms: i64) {
        let handles = self.surfaces.lock().handles();
        if handles.is_empty() {
            return;
        }

        let round = collect_all(handles, config.auxiliary_timeout(), now_ms).await;

        let mut state = self.state.lock();
        if !self.is_current(session) {
            debug!("Engine stopped during collection, discarding {} samples", round.samples.len());
            return;
        }
        let surfaces = self.surfaces.lock();
        for sample in round.samples {
            // Unregistered while the request was in flight
            if !surfaces.contains(&sample.process_id) {
                continue;
            }
            state.samples.push(sample.clone());
            state.check_auxiliary_thresholds(&sample, config, now_ms);
            state.check_oom(&sample, config, now_ms);
        }
    }

    fn publish_metric(&self, name: &str, value: f64, timestamp: i64) {
        self.events.publish(TelemetryEvent::Metric {
            name: name.to_string(),
            value,
            timestamp,
        });
    }

    fn build_report(&self) -> Report {
        let config = self.config.read();
        let state = self.state.lock();
        report::generate_report(
            &state.metrics,
            &state.snapshots,
            &state.alerts,
            &config.thresholds,
            state.started_at,
            Utc::now(),
        )
    }

    fn export_report(&self, path: Option<&Path>) -> Result<PathBuf, TelemetryError> {
        let report = self.build_report();
        let export_dir = self.config.read().export_dir.clone();
        let written = report::export_report(&report, path, &export_dir, Utc::now())?;
        self.events.publish(TelemetryEvent::ReportExported {
            path: written.clone(),
        });
        Ok(written)
    }
}

fn spawn_sampler(
    runtime: &Handle,
    inner: &Arc<Inner>,
    session: u64,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    let mut period = inner.config.read().sampling_interval();

    runtime.spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(inner) = weak.upgrade() else { break };
                    inner.run_tick(Some(session)).await;

                    let configured = inner.config.read().sampling_interval();
                    if configured != period {
                        info!("⏱️ Sampling interval changed to {:?}", configured);
                        period = configured;
                        ticker = time::interval_at(time::Instant::now() + period, period);
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("Sampling loop for session {} finished", session);
    })
}

fn spawn_auto_export(runtime: &Handle, inner: &Arc<Inner>, period: Duration) -> JoinHandle<()> {
    let weak: Weak<Inner> = Arc::downgrade(inner);

    runtime.spawn(async move {
        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else { break };
            if let Err(e) = inner.export_report(None) {
                warn!("❌ Auto-export failed: {}", e);
            }
        }
    })
}

/// Point-in-time engine status
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_ms: i64,
    pub metric_count: usize,
    pub snapshot_count: usize,
    pub alert_count: usize,
    pub surface_count: usize,
    pub pending_timings: usize,
    pub config: TelemetryConfig,
}

#[derive(Clone)]
pub struct TelemetryEngine {
    inner: Arc<Inner>,
}

impl TelemetryEngine {
    /// Engine sampling the current process through `sysinfo`
    pub fn new(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        Self::with_resource_source(config, Box::new(SysinfoResourceSource::current_process()))
    }

    pub fn with_resource_source(
        config: TelemetryConfig,
        resource_source: Box<dyn ProcessResourceSource>,
    ) -> Result<Self, TelemetryError> {
        config.validate()?;
        let events = EventBus::new();
        let state = EngineState::new(&config, events.clone());

        Ok(Self {
            inner: Arc::new(Inner {
                config: RwLock::new(config),
                state: Mutex::new(state),
                resource_source: Mutex::new(resource_source),
                surfaces: Mutex::new(SurfaceRegistry::new()),
                events,
                running: AtomicBool::new(false),
                session: AtomicU64::new(0),
                tasks: Mutex::new(None),
            }),
        })
    }

    /// Start the sampling loop (and auto-export, if enabled) on the current runtime
    pub fn start(&self) -> Result<(), TelemetryError> {
        let runtime = Handle::try_current()?;
        let mut tasks = self.inner.tasks.lock();
        if self.inner.running.swap(true, Ordering::SeqCst) {
            warn!("Telemetry engine already running");
            return Ok(());
        }

        let session = self.inner.session.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.state.lock().started_at = Some(Utc::now());

        let config = self.inner.config.read().clone();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let sampler = spawn_sampler(&runtime, &self.inner, session, shutdown_rx);
        let auto_export = config
            .auto_export
            .then(|| spawn_auto_export(&runtime, &self.inner, config.auto_export_interval()));

        *tasks = Some(RunningTasks {
            runtime,
            shutdown,
            sampler,
            auto_export,
        });

        info!(
            "🚀 Telemetry engine started (interval {:?}, history {})",
            config.sampling_interval(),
            config.history_size
        );
        self.inner.events.publish(TelemetryEvent::Started);
        Ok(())
    }

    /// Stop sampling and auto-export. Collection rounds still in flight finish
    /// but their results are dropped.
    pub fn stop(&self) {
        let mut tasks = self.inner.tasks.lock();
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.session.fetch_add(1, Ordering::SeqCst);

        if let Some(tasks) = tasks.take() {
            let _ = tasks.shutdown.send(true);
            if let Some(handle) = tasks.auto_export {
                handle.abort();
            }
            // Detached; the loop exits once it sees the shutdown signal
            drop(tasks.sampler);
        }

        info!("🛑 Telemetry engine stopped");
        self.inner.events.publish(TelemetryEvent::Stopped);
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Run one sampling tick immediately, independent of the loop
    pub async fn sample_now(&self) {
        self.inner.run_tick(None).await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.inner.events.subscribe()
    }

    pub fn config(&self) -> TelemetryConfig {
        self.inner.config.read().clone()
    }

    // Recording

    pub fn register_metric(&self, name: &str, category: MetricCategory, unit: &str) {
        self.inner.state.lock().metrics.register(name, category, unit);
    }

    /// Record a value for a registered metric. Unknown names are logged and ignored.
    pub fn record_metric(&self, name: &str, value: f64, metadata: Option<HashMap<String, String>>) -> bool {
        let timestamp = Utc::now().timestamp_millis();
        let stored = self.inner.state.lock().metrics.record(name, value, timestamp, metadata);
        if stored {
            self.inner.publish_metric(name, value, timestamp);
        }
        stored
    }

    pub fn start_timing(&self, channel: &str, request_id: &str) {
        self.inner
            .state
            .lock()
            .timings
            .start_at(channel, request_id, Instant::now());
    }

    /// Finish a timing and return its duration in milliseconds, or 0 when no
    /// matching start exists
    pub fn end_timing(&self, channel: &str, request_id: &str, success: bool, error: Option<String>) -> f64 {
        let now = Instant::now();
        let timestamp = Utc::now().timestamp_millis();
        let (completed, recorded) = {
            let mut state = self.inner.state.lock();
            let EngineState { metrics: store, timings, .. } = &mut *state;
            let completed = timings.end_at(store, channel, request_id, success, error, now, timestamp);
            let mut recorded = Vec::new();
            if let Some(done) = &completed {
                recorded.push((metrics::IPC_LATENCY, done.duration_ms));
                recorded.push((metrics::IPC_MESSAGES, timings.message_count() as f64));
                if !done.success {
                    recorded.push((metrics::IPC_ERRORS, timings.error_count() as f64));
                }
            }
            (completed, recorded)
        };

        let Some(done) = completed else {
            return 0.0;
        };
        for (name, value) in recorded {
            self.inner.publish_metric(name, value, timestamp);
        }
        let duration = done.duration_ms;
        self.inner.events.publish(TelemetryEvent::IpcComplete(done));
        duration
    }

    pub fn record_voice_stage_timing(&self, stage: &str, duration_ms: f64) {
        let Some(metric) = timing::voice_stage_metric(stage) else {
            warn!("⚠️ Ignoring timing for unknown voice stage: {}", stage);
            return;
        };
        let timestamp = Utc::now().timestamp_millis();
        let stored = {
            let mut state = self.inner.state.lock();
            let stored = state.metrics.record(metric, duration_ms, timestamp, None);
            let voice = state.voice.get_or_insert_with(VoiceTimings::default);
            voice.stages.insert(stage.to_string(), duration_ms);
            voice.updated_at = timestamp;
            stored
        };
        if stored {
            self.inner.publish_metric(metric, duration_ms, timestamp);
        }
        self.inner.events.publish(TelemetryEvent::VoiceTiming {
            stage: stage.to_string(),
            duration_ms,
        });
    }

    pub fn update_render_metrics(&self, render: RenderMetrics) {
        let timestamp = Utc::now().timestamp_millis();
        let recorded = {
            let mut state = self.inner.state.lock();
            let recorded: Vec<(&str, f64)> = [(metrics::FPS, render.fps), (metrics::FRAME_TIME, render.frame_time_ms)]
                .into_iter()
                .filter(|(name, value)| state.metrics.record(name, *value, timestamp, None))
                .collect();
            state.render = Some(render.clone());
            recorded
        };
        for (name, value) in recorded {
            self.inner.publish_metric(name, value, timestamp);
        }
        self.inner.events.publish(TelemetryEvent::RenderMetrics(render));
    }

    /// Listener count reported by one source; 0 removes the source
    pub fn track_listener_count(&self, source: &str, count: u64) {
        self.inner.state.lock().counters.set_listener_count(source, count);
    }

    pub fn set_active_timer_count(&self, count: u64) {
        self.inner.state.lock().counters.set_active_timers(count);
    }

    // Auxiliary surfaces

    pub fn register_surface(&self, id: &str, evaluator: Arc<dyn RemoteHeapEvaluator>) {
        if id == PRIMARY_PROCESS_ID {
            warn!("⚠️ Surface id {} is reserved for the primary process", id);
            return;
        }
        if self.inner.surfaces.lock().register(id, evaluator) {
            debug!("Replaced evaluator for surface {}", id);
        } else {
            info!("🪟 Registered surface {}", id);
        }
    }

    /// Forget a surface and drop its sample history
    pub fn unregister_surface(&self, id: &str) -> bool {
        let removed = self.inner.surfaces.lock().unregister(id);
        if removed {
            let mut state = self.inner.state.lock();
            state.samples.remove(id);
            state.throttle.forget_process(id);
            info!("Unregistered surface {}", id);
        }
        removed
    }

    // Queries

    pub fn get_metrics_summary(&self) -> BTreeMap<String, MetricSummary> {
        self.inner.state.lock().metrics.summary()
    }

    pub fn get_metric_history(&self, name: &str, limit: Option<usize>) -> Vec<DataPoint> {
        self.inner.state.lock().metrics.history(name, limit)
    }

    pub fn get_snapshots(&self, limit: Option<usize>) -> Vec<Snapshot> {
        self.inner.state.lock().snapshots.recent(limit)
    }

    /// Most recent `count` alerts, newest first
    pub fn get_alerts(&self, count: usize) -> Vec<Alert> {
        self.inner.state.lock().alerts.recent(count)
    }

    pub fn get_status(&self) -> EngineStatus {
        let config = self.config();
        let surface_count = self.inner.surfaces.lock().len();
        let state = self.inner.state.lock();
        let running = self.is_running();
        let uptime_ms = match (running, state.started_at) {
            (true, Some(started)) => (Utc::now() - started).num_milliseconds().max(0),
            _ => 0,
        };

        EngineStatus {
            running,
            started_at: state.started_at,
            uptime_ms,
            metric_count: state.metrics.len(),
            snapshot_count: state.snapshots.len(),
            alert_count: state.alerts.len(),
            surface_count,
            pending_timings: state.timings.pending_count(),
            config,
        }
    }

    /// Growth analysis over the configured window for one process buffer
    pub fn analyze_growth(&self, kind: ProcessKind, process_id: Option<&str>) -> GrowthAnalysis {
        let config = self.config();
        let now_ms = Utc::now().timestamp_millis();
        self.inner.state.lock().analyze(kind, process_id, &config, now_ms)
    }

    /// Leak pattern for the primary process, if its heap is currently leaking
    pub fn detect_leak_pattern(&self) -> Option<LeakPatternMatch> {
        let config = self.config();
        let now_ms = Utc::now().timestamp_millis();
        let state = self.inner.state.lock();
        let analysis = state.analyze(ProcessKind::Primary, None, &config, now_ms);
        classify_leak(&analysis, &state.counters)
    }

    // Configuration, reset, reports

    /// Validate and apply a new configuration. Buffers are resized immediately;
    /// a new sampling interval takes effect after the current tick.
    pub fn update_config(&self, config: TelemetryConfig) -> Result<(), TelemetryError> {
        config.validate()?;
        self.inner.state.lock().resize(&config);

        let previous = std::mem::replace(&mut *self.inner.config.write(), config.clone());

        let export_changed = previous.auto_export != config.auto_export
            || previous.auto_export_interval_secs != config.auto_export_interval_secs;
        if export_changed {
            let mut tasks = self.inner.tasks.lock();
            if let Some(tasks) = tasks.as_mut() {
                if let Some(handle) = tasks.auto_export.take() {
                    handle.abort();
                }
                if config.auto_export {
                    tasks.auto_export = Some(spawn_auto_export(
                        &tasks.runtime,
                        &self.inner,
                        config.auto_export_interval(),
                    ));
                }
            }
        }

        info!("🔧 Telemetry configuration updated");
        self.inner.events.publish(TelemetryEvent::ConfigUpdated);
        Ok(())
    }

    /// Clear recorded data. The metric registry, surfaces and config are kept.
    pub fn reset(&self) {
        {
            let mut state = self.inner.state.lock();
            state.metrics.clear();
            state.timings.clear();
            state.samples.clear();
            state.snapshots.clear();
            state.alerts.clear();
            state.throttle.clear();
            state.counters.clear();
            state.cpu.reset();
            state.voice = None;
            state.render = None;
        }
        info!("🔄 Telemetry data reset");
        self.inner.events.publish(TelemetryEvent::Reset);
    }

    pub fn generate_report(&self) -> Report {
        self.inner.build_report()
    }

    /// Export a report to `path`, or to a timestamped file in the export directory
    pub fn export_report(&self, path: Option<&Path>) -> Result<PathBuf, TelemetryError> {
        self.inner.export_report(path)
    }
}

impl std::fmt::Debug for TelemetryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryEngine")
            .field("running", &self.is_running())
            .field("surfaces", &self.inner.surfaces.lock().ids())
            .finish()
    }
}
