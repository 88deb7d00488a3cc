//! Component tests for the control loop
//!
//! All collaborators are in-memory mocks, so these exercise the full
//! pipeline (status, logs, metrics, observation, policy, actuation,
//! history) without any network.

use crate::actuator::{ClusterScaler, HistoryStore, ReplicaStatus, ServiceHistory};
use crate::config::{RawServiceConfig, ScalerConfig, ServiceScalingConfig};
use crate::control::{ControlLoopBuilder, LoopPhase, Scheduler, ServiceLoop, TickOutcome};
use crate::error::{Result, ScalerError};
use crate::health::{components, ComponentStatus, HealthRegistry};
use crate::models::{LogEvent, Observation};
use crate::policy::PolicyClient;
use crate::source::{LogSource, MetricsSource};
use crate::timeline::protocol::{arrival_line, completion_line};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

const SEC: i64 = 1_000_000_000;

#[derive(Default)]
struct MockLogs {
    failing: HashSet<String>,
}

#[async_trait]
impl LogSource for MockLogs {
    async fn fetch_events(
        &self,
        service: &ServiceScalingConfig,
        _window: Duration,
    ) -> Result<Vec<LogEvent>> {
        let name = service.name();
        if self.failing.contains(name) {
            return Err(ScalerError::data_unavailable("loki", name, "connection refused"));
        }
        Ok(vec![
            LogEvent::new(name, 0, arrival_line(1)),
            LogEvent::new(name, SEC, arrival_line(2)),
            LogEvent::new(name, 2 * SEC, completion_line(1, 200)),
            LogEvent::new(name, 3 * SEC, completion_line(7, 200)),
        ])
    }
}

struct MockMetrics {
    value: Option<f64>,
}

#[async_trait]
impl MetricsSource for MockMetrics {
    async fn fetch_utilization(
        &self,
        _service: &ServiceScalingConfig,
        _window: Duration,
    ) -> Result<Option<f64>> {
        Ok(self.value)
    }
}

struct MockPolicy {
    target: u32,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockPolicy {
    fn answering(target: u32) -> Self {
        Self {
            target,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    fn slow(target: u32, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::answering(target)
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PolicyClient for MockPolicy {
    async fn decide(&self, _service: &str, _observation: &Observation) -> Result<u32> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.target)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct MockScaler {
    replicas: Mutex<HashMap<String, u32>>,
    scale_calls: Mutex<Vec<(String, u32)>>,
    reject: bool,
}

impl MockScaler {
    fn with(apps: &[(&str, u32)]) -> Self {
        Self {
            replicas: Mutex::new(apps.iter().map(|(a, n)| (a.to_string(), *n)).collect()),
            ..Default::default()
        }
    }

    fn rejecting(apps: &[(&str, u32)]) -> Self {
        Self {
            reject: true,
            ..Self::with(apps)
        }
    }

    fn calls(&self) -> Vec<(String, u32)> {
        self.scale_calls.lock().unwrap().clone()
    }

    fn replicas(&self, app: &str) -> Option<u32> {
        self.replicas.lock().unwrap().get(app).copied()
    }
}

#[async_trait]
impl ClusterScaler for MockScaler {
    async fn scale(&self, app: &str, instances: u32) -> Result<()> {
        self.scale_calls
            .lock()
            .unwrap()
            .push((app.to_string(), instances));
        if self.reject {
            return Err(ScalerError::actuation_failure(app, instances, "rejected"));
        }
        self.replicas
            .lock()
            .unwrap()
            .insert(app.to_string(), instances);
        Ok(())
    }

    async fn status(&self, app: &str) -> Result<ReplicaStatus> {
        self.replicas(app)
            .map(|instances| ReplicaStatus {
                instances,
                available: instances,
            })
            .ok_or_else(|| ScalerError::data_unavailable("control_plane", app, "unknown app"))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[derive(Default)]
struct MemoryStore {
    saved: Mutex<HashMap<String, ServiceHistory>>,
}

impl MemoryStore {
    fn entries(&self, app: &str) -> usize {
        self.saved
            .lock()
            .unwrap()
            .get(app)
            .map(|h| h.history.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn load(&self, app_name: &str) -> Result<ServiceHistory> {
        Ok(self
            .saved
            .lock()
            .unwrap()
            .get(app_name)
            .cloned()
            .unwrap_or_else(|| ServiceHistory::new(app_name)))
    }

    async fn save(&self, history: &ServiceHistory) -> Result<()> {
        self.saved
            .lock()
            .unwrap()
            .insert(history.app_name.clone(), history.clone());
        Ok(())
    }
}

fn service(name: &str) -> ServiceScalingConfig {
    let mut raw = RawServiceConfig::new(name);
    raw.max_replicas = 5;
    ServiceScalingConfig::try_from(raw).unwrap()
}

fn config(names: &[&str], timeout_ms: u64) -> ScalerConfig {
    let mut config = ScalerConfig::with_services(names.iter().map(|n| service(n)).collect());
    config.tick_interval_secs = 1;
    config.window_secs = 10;
    config.request_timeout_ms = timeout_ms;
    config
}

/// Current value of `log_scaler_stage_errors_total` for one label set
fn stage_errors(service: &str, stage: &str, kind: &str) -> u64 {
    let wanted = [("service", service), ("stage", stage), ("kind", kind)];
    prometheus::gather()
        .iter()
        .filter(|family| family.get_name() == "log_scaler_stage_errors_total")
        .flat_map(|family| family.get_metric())
        .find(|metric| {
            wanted.iter().all(|(name, value)| {
                metric
                    .get_label()
                    .iter()
                    .any(|l| l.get_name() == *name && l.get_value() == *value)
            })
        })
        .map(|metric| metric.get_counter().get_value() as u64)
        .unwrap_or(0)
}

struct Harness {
    logs: Arc<MockLogs>,
    metrics: Arc<MockMetrics>,
    policy: Arc<MockPolicy>,
    scaler: Arc<MockScaler>,
    store: Arc<MemoryStore>,
    health: HealthRegistry,
}

impl Harness {
    fn new(policy: MockPolicy, scaler: MockScaler) -> Self {
        Self {
            logs: Arc::new(MockLogs::default()),
            metrics: Arc::new(MockMetrics { value: Some(0.4) }),
            policy: Arc::new(policy),
            scaler: Arc::new(scaler),
            store: Arc::new(MemoryStore::default()),
            health: HealthRegistry::new(),
        }
    }

    async fn scheduler(&self, config: ScalerConfig) -> anyhow::Result<Scheduler> {
        ControlLoopBuilder::new(config)
            .log_source(self.logs.clone())
            .metrics_source(self.metrics.clone())
            .policy(self.policy.clone())
            .scaler(self.scaler.clone())
            .history_store(self.store.clone())
            .health(self.health.clone())
            .build()
            .await
    }

    async fn single_loop(&self, name: &str, timeout_ms: u64) -> ServiceLoop {
        self.scheduler(config(&[name], timeout_ms))
            .await
            .unwrap()
            .into_loops()
            .remove(0)
    }
}

#[tokio::test]
async fn test_tick_scales_when_target_differs() {
    let harness = Harness::new(MockPolicy::answering(3), MockScaler::with(&[("svc", 2)]));
    let mut service_loop = harness.single_loop("svc", 1000).await;

    let outcome = service_loop.run_tick().await;

    assert_eq!(outcome, TickOutcome::Scaled { from: 2, to: 3 });
    assert_eq!(harness.scaler.calls(), vec![("svc".to_string(), 3)]);
    assert_eq!(service_loop.actuator().current_replicas(), Some(3));
    assert_eq!(harness.store.entries("svc"), 1);

    let decision = service_loop.actuator().state().last_decision.clone().unwrap();
    assert_eq!(decision.target_replicas, 3);
    assert_eq!(decision.correlation_id, "svc-1");
}

#[tokio::test]
async fn test_tick_without_change_makes_no_scale_call() {
    let harness = Harness::new(MockPolicy::answering(2), MockScaler::with(&[("svc", 2)]));
    let mut service_loop = harness.single_loop("svc", 1000).await;

    assert_eq!(
        service_loop.run_tick().await,
        TickOutcome::Unchanged { replicas: 2 }
    );
    assert_eq!(
        service_loop.run_tick().await,
        TickOutcome::Unchanged { replicas: 2 }
    );

    assert!(harness.scaler.calls().is_empty());
    assert_eq!(harness.store.entries("svc"), 2);
}

#[tokio::test]
async fn test_slow_policy_holds_replicas() {
    let harness = Harness::new(
        MockPolicy::slow(4, Duration::from_millis(500)),
        MockScaler::with(&[("svc", 2)]),
    );
    let mut service_loop = harness.single_loop("svc", 50).await;

    let outcome = service_loop.run_tick().await;

    assert_eq!(outcome, TickOutcome::Held { replicas: 2 });
    assert_eq!(harness.policy.calls(), 1);
    assert!(harness.scaler.calls().is_empty());
    assert_eq!(harness.scaler.replicas("svc"), Some(2));
    assert_eq!(harness.store.entries("svc"), 0);

    let health = harness.health.health().await;
    assert_eq!(
        health.components[components::POLICY].status,
        ComponentStatus::Degraded
    );
}

#[tokio::test]
async fn test_policy_timeout_counts_one_error_per_tick() {
    let harness = Harness::new(
        MockPolicy::slow(4, Duration::from_millis(500)),
        MockScaler::with(&[("held-svc", 2)]),
    );
    let mut service_loop = harness.single_loop("held-svc", 50).await;
    let before = stage_errors("held-svc", "policy", "policy_unreachable");

    assert_eq!(
        service_loop.run_tick().await,
        TickOutcome::Held { replicas: 2 }
    );
    assert_eq!(
        stage_errors("held-svc", "policy", "policy_unreachable"),
        before + 1
    );

    service_loop.run_tick().await;
    assert_eq!(
        stage_errors("held-svc", "policy", "policy_unreachable"),
        before + 2
    );
}

#[tokio::test]
async fn test_unknown_utilization_skips_before_policy() {
    let mut harness = Harness::new(MockPolicy::answering(3), MockScaler::with(&[("svc", 2)]));
    harness.metrics = Arc::new(MockMetrics { value: None });
    let mut service_loop = harness.single_loop("svc", 1000).await;

    let outcome = service_loop.run_tick().await;

    assert_eq!(
        outcome,
        TickOutcome::Skipped {
            stage: "observation"
        }
    );
    assert_eq!(harness.policy.calls(), 0);
    assert!(harness.scaler.calls().is_empty());
}

#[tokio::test]
async fn test_log_failure_skips_before_policy() {
    let mut harness = Harness::new(MockPolicy::answering(3), MockScaler::with(&[("svc", 2)]));
    harness.logs = Arc::new(MockLogs {
        failing: HashSet::from(["svc".to_string()]),
    });
    let mut service_loop = harness.single_loop("svc", 1000).await;

    assert_eq!(
        service_loop.run_tick().await,
        TickOutcome::Skipped { stage: "logs" }
    );
    assert_eq!(harness.policy.calls(), 0);
}

#[tokio::test]
async fn test_unknown_status_skips() {
    let harness = Harness::new(MockPolicy::answering(3), MockScaler::default());
    let mut service_loop = harness.single_loop("svc", 1000).await;

    assert_eq!(
        service_loop.run_tick().await,
        TickOutcome::Skipped { stage: "status" }
    );
    assert_eq!(harness.policy.calls(), 0);
}

#[tokio::test]
async fn test_actuation_failure_leaves_state_and_retries_from_status() {
    let harness = Harness::new(
        MockPolicy::answering(4),
        MockScaler::rejecting(&[("svc", 2)]),
    );
    let mut service_loop = harness.single_loop("svc", 1000).await;

    assert_eq!(
        service_loop.run_tick().await,
        TickOutcome::ActuationFailed { replicas: 2 }
    );
    assert_eq!(service_loop.actuator().current_replicas(), Some(2));
    assert!(service_loop.actuator().state().last_decision.is_none());
    assert_eq!(harness.store.entries("svc"), 0);

    // Someone fixed the deployment out of band; the next tick sees it
    harness
        .scaler
        .replicas
        .lock()
        .unwrap()
        .insert("svc".to_string(), 4);
    assert_eq!(
        service_loop.run_tick().await,
        TickOutcome::Unchanged { replicas: 4 }
    );
    assert_eq!(harness.scaler.calls().len(), 1);
}

#[tokio::test]
async fn test_failing_service_does_not_stop_others() {
    let mut harness = Harness::new(
        MockPolicy::answering(3),
        MockScaler::with(&[("good", 1), ("bad", 1)]),
    );
    harness.logs = Arc::new(MockLogs {
        failing: HashSet::from(["bad".to_string()]),
    });

    let scheduler = harness.scheduler(config(&["good", "bad"], 1000)).await.unwrap();
    let registry = scheduler.registry();
    assert_eq!(scheduler.len(), 2);
    assert_eq!(scheduler.services(), vec!["good", "bad"]);

    let (shutdown_tx, _) = broadcast::channel(1);
    let handles = scheduler.spawn(&shutdown_tx);

    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown_tx.send(()).unwrap();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    assert_eq!(harness.scaler.calls(), vec![("good".to_string(), 3)]);
    assert_eq!(harness.scaler.replicas("bad"), Some(1));

    let good = registry.get("good").unwrap();
    assert_eq!(good.current_replicas, Some(3));
    assert_eq!(good.last_outcome.as_deref(), Some("scaled"));
    assert_eq!(good.phase, LoopPhase::Idle);
    assert_eq!(
        registry.get("bad").unwrap().last_outcome.as_deref(),
        Some("skipped")
    );
}

#[tokio::test]
async fn test_shutdown_waits_for_inflight_tick() {
    let harness = Harness::new(
        MockPolicy::slow(3, Duration::from_millis(300)),
        MockScaler::with(&[("svc", 2)]),
    );
    let scheduler = harness.scheduler(config(&["svc"], 1000)).await.unwrap();
    let registry = scheduler.registry();

    let (shutdown_tx, _) = broadcast::channel(1);
    let handles = scheduler.spawn(&shutdown_tx);

    // The first tick fires immediately and is now waiting on the policy
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.policy.calls(), 1);
    shutdown_tx.send(()).unwrap();

    for handle in handles {
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    assert_eq!(harness.scaler.calls(), vec![("svc".to_string(), 3)]);
    assert_eq!(harness.store.entries("svc"), 1);
    assert_eq!(
        registry.get("svc").unwrap().last_outcome.as_deref(),
        Some("scaled")
    );
}

#[tokio::test]
async fn test_history_resumes_from_store() {
    let harness = Harness::new(MockPolicy::answering(3), MockScaler::with(&[("svc", 2)]));
    harness.single_loop("svc", 1000).await.run_tick().await;
    assert_eq!(harness.store.entries("svc"), 1);

    // A restarted loop appends to the persisted document
    let mut restarted = harness.single_loop("svc", 1000).await;
    restarted.run_tick().await;
    assert_eq!(harness.store.entries("svc"), 2);
}

#[tokio::test]
async fn test_missing_adapter_fails_build() {
    let result = ControlLoopBuilder::new(config(&["svc"], 1000)).build().await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_invalid_config_fails_build() {
    let harness = Harness::new(MockPolicy::answering(1), MockScaler::with(&[("svc", 1)]));
    let duplicate = config(&["svc", "svc"], 1000);
    assert!(harness.scheduler(duplicate).await.is_err());
}
