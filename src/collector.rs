//! Cross-process heap collection
//!
//! Each auxiliary surface reports its own heap figures through a
//! [`RemoteHeapEvaluator`]. A collection round queries every registered surface
//! concurrently, bounds each query with a timeout and isolates failures so one
//! unresponsive surface never holds up the others.

use crate::errors::CollectionError;
use crate::memory::{ProcessKind, ProcessMemorySample};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Heap figures self-reported by a surface, in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteHeapStats {
    pub used_heap: u64,
    pub total_heap: u64,
    /// 0 when the surface cannot report a limit
    pub heap_limit: u64,
}

/// Remote-evaluation capability of one auxiliary surface
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteHeapEvaluator: Send + Sync {
    async fn evaluate_heap(&self) -> Result<RemoteHeapStats, CollectionError>;
}

/// Known auxiliary surfaces keyed by id
#[derive(Default, Clone)]
pub struct SurfaceRegistry {
    surfaces: BTreeMap<String, Arc<dyn RemoteHeapEvaluator>>,
}

impl SurfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a surface, replacing any evaluator already registered under `id`
    pub fn register(&mut self, id: &str, evaluator: Arc<dyn RemoteHeapEvaluator>) -> bool {
        self.surfaces.insert(id.to_string(), evaluator).is_some()
    }

    pub fn unregister(&mut self, id: &str) -> bool {
        self.surfaces.remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.surfaces.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.surfaces.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    /// Owned handles for one collection round, so no lock is held across awaits
    pub fn handles(&self) -> Vec<(String, Arc<dyn RemoteHeapEvaluator>)> {
        self.surfaces
            .iter()
            .map(|(id, evaluator)| (id.clone(), Arc::clone(evaluator)))
            .collect()
    }
}

impl std::fmt::Debug for SurfaceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceRegistry")
            .field("surfaces", &self.surfaces.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Outcome of one collection round
#[derive(Debug, Default)]
pub struct CollectionRound {
    pub samples: Vec<ProcessMemorySample>,
    pub failures: Vec<(String, CollectionError)>,
}

fn to_sample(id: &str, stats: RemoteHeapStats, timestamp: i64) -> ProcessMemorySample {
    ProcessMemorySample {
        timestamp,
        process_id: id.to_string(),
        process_kind: ProcessKind::Auxiliary,
        heap_used: stats.used_heap,
        heap_total: stats.total_heap,
        heap_limit: stats.heap_limit,
        resident_set_size: 0,
        external_memory: 0,
    }
}

/// Query every surface concurrently and wait for all of them
pub async fn collect_all(
    surfaces: Vec<(String, Arc<dyn RemoteHeapEvaluator>)>,
    timeout: Duration,
    timestamp: i64,
) -> CollectionRound {
    let futures = surfaces.into_iter().map(|(id, evaluator)| async move {
        let result = match tokio::time::timeout(timeout, evaluator.evaluate_heap()).await {
            Ok(result) => result,
            Err(_) => Err(CollectionError::Timeout {
                surface: id.clone(),
                timeout,
            }),
        };
        (id, result)
    });

    let mut round = CollectionRound::default();
    for (id, result) in join_all(futures).await {
        match result {
            Ok(stats) => round.samples.push(to_sample(&id, stats, timestamp)),
            Err(e) => {
                debug!("Skipping surface {} this tick: {}", id, e);
                round.failures.push((id, e));
            }
        }
    }
    round
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowSurface;

    #[async_trait]
    impl RemoteHeapEvaluator for SlowSurface {
        async fn evaluate_heap(&self) -> Result<RemoteHeapStats, CollectionError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(RemoteHeapStats::default())
        }
    }

    fn healthy(used: u64) -> Arc<dyn RemoteHeapEvaluator> {
        let mut mock = MockRemoteHeapEvaluator::new();
        mock.expect_evaluate_heap().returning(move || {
            Ok(RemoteHeapStats {
                used_heap: used,
                total_heap: used * 2,
                heap_limit: used * 4,
            })
        });
        Arc::new(mock)
    }

    fn destroyed(id: &'static str) -> Arc<dyn RemoteHeapEvaluator> {
        let mut mock = MockRemoteHeapEvaluator::new();
        mock.expect_evaluate_heap()
            .returning(move || Err(CollectionError::SurfaceDestroyed(id.to_string())));
        Arc::new(mock)
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let mut registry = SurfaceRegistry::new();
        registry.register("overlay", healthy(1000));
        registry.register("gone", destroyed("gone"));
        registry.register("settings", healthy(2000));

        let round = collect_all(registry.handles(), Duration::from_millis(500), 42).await;

        assert_eq!(round.samples.len(), 2);
        assert_eq!(round.failures.len(), 1);
        assert_eq!(round.failures[0].0, "gone");

        let overlay = round.samples.iter().find(|s| s.process_id == "overlay").unwrap();
        assert_eq!(overlay.process_kind, ProcessKind::Auxiliary);
        assert_eq!(overlay.heap_used, 1000);
        assert_eq!(overlay.heap_limit, 4000);
        assert_eq!(overlay.timestamp, 42);
    }

    #[tokio::test]
    async fn test_unresponsive_surface_times_out() {
        let mut registry = SurfaceRegistry::new();
        registry.register("stuck", Arc::new(SlowSurface));
        registry.register("overlay", healthy(1000));

        let started = std::time::Instant::now();
        let round = collect_all(registry.handles(), Duration::from_millis(50), 0).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(round.samples.len(), 1);
        assert!(matches!(
            round.failures[0].1,
            CollectionError::Timeout { ref surface, .. } if surface == "stuck"
        ));
    }

    #[tokio::test]
    async fn test_empty_round() {
        let round = collect_all(Vec::new(), Duration::from_millis(10), 0).await;
        assert!(round.samples.is_empty());
        assert!(round.failures.is_empty());
    }

    #[test]
    fn test_registry_replace_and_remove() {
        let mut registry = SurfaceRegistry::new();
        assert!(!registry.register("overlay", healthy(1)));
        assert!(registry.register("overlay", healthy(2)));
        assert_eq!(registry.ids(), vec!["overlay".to_string()]);
        assert!(registry.unregister("overlay"));
        assert!(!registry.unregister("overlay"));
        assert!(registry.is_empty());
    }
}
