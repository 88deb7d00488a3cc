//! Observability infrastructure for the control loop
//!
//! Provides:
//! - Prometheus metrics (tick latency, stage errors, replicas, observations, decisions)
//! - Structured JSON logging with tracing

use crate::error::ScalerError;
use crate::models::{Observation, WindowMetrics};
use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, GaugeVec, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for tick latency (in seconds)
const TICK_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ScalerMetricsInner> = OnceLock::new();

struct ScalerMetricsInner {
    tick_latency_seconds: HistogramVec,
    stage_errors: IntCounterVec,
    current_replicas: IntGaugeVec,
    observation: GaugeVec,
    decisions: IntCounterVec,
    scale_actions: IntCounterVec,
    orphan_completions: IntCounterVec,
    services_monitored: IntGauge,
}

impl ScalerMetricsInner {
    fn new() -> Self {
        Self {
            tick_latency_seconds: register_histogram_vec!(
                "log_scaler_tick_latency_seconds",
                "Time spent running one control loop tick",
                &["service"],
                TICK_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_latency_seconds"),

            stage_errors: register_int_counter_vec!(
                "log_scaler_stage_errors_total",
                "Per-stage errors recovered by the control loop",
                &["service", "stage", "kind"]
            )
            .expect("Failed to register stage_errors"),

            current_replicas: register_int_gauge_vec!(
                "log_scaler_current_replicas",
                "Replica count last confirmed by the control plane",
                &["service"]
            )
            .expect("Failed to register current_replicas"),

            observation: register_gauge_vec!(
                "log_scaler_observation",
                "Last observation sent to the policy",
                &["service", "feature"]
            )
            .expect("Failed to register observation"),

            decisions: register_int_counter_vec!(
                "log_scaler_decisions_total",
                "Policy decisions by outcome",
                &["service", "outcome"]
            )
            .expect("Failed to register decisions"),

            scale_actions: register_int_counter_vec!(
                "log_scaler_scale_actions_total",
                "Scale mutations confirmed by the control plane",
                &["service", "direction"]
            )
            .expect("Failed to register scale_actions"),

            orphan_completions: register_int_counter_vec!(
                "log_scaler_orphan_completions_total",
                "Completion lines dropped for lack of an arrival",
                &["service"]
            )
            .expect("Failed to register orphan_completions"),

            services_monitored: register_int_gauge!(
                "log_scaler_services_monitored",
                "Number of services owned by this instance"
            )
            .expect("Failed to register services_monitored"),
        }
    }
}

/// Control loop metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct ScalerMetrics {
    _private: (),
}

impl Default for ScalerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalerMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ScalerMetricsInner {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new)
    }

    pub fn observe_tick_latency(&self, service: &str, duration_secs: f64) {
        self.inner()
            .tick_latency_seconds
            .with_label_values(&[service])
            .observe(duration_secs);
    }

    /// Count an error recovered at `stage`
    pub fn inc_stage_error(&self, service: &str, stage: &str, error: &ScalerError) {
        self.inner()
            .stage_errors
            .with_label_values(&[service, stage, error.kind()])
            .inc();
    }

    pub fn set_current_replicas(&self, service: &str, replicas: u32) {
        self.inner()
            .current_replicas
            .with_label_values(&[service])
            .set(replicas as i64);
    }

    pub fn set_observation(&self, service: &str, observation: &Observation) {
        for (feature, value) in observation.features() {
            self.inner()
                .observation
                .with_label_values(&[service, feature])
                .set(value);
        }
    }

    /// `outcome` is `decided` or `held`
    pub fn inc_decision(&self, service: &str, outcome: &str) {
        self.inner()
            .decisions
            .with_label_values(&[service, outcome])
            .inc();
    }

    pub fn inc_scale_action(&self, service: &str, from: u32, to: u32) {
        let direction = if to > from { "up" } else { "down" };
        self.inner()
            .scale_actions
            .with_label_values(&[service, direction])
            .inc();
    }

    pub fn add_orphan_completions(&self, service: &str, count: usize) {
        if count > 0 {
            self.inner()
                .orphan_completions
                .with_label_values(&[service])
                .inc_by(count as u64);
        }
    }

    pub fn set_services_monitored(&self, count: usize) {
        self.inner().services_monitored.set(count as i64);
    }
}

/// Structured logger for control loop events
///
/// Provides consistent JSON-formatted logging for ticks, skips, holds and
/// other significant events.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, services: &[&str]) {
        info!(
            event = "agent_started",
            instance = %self.instance,
            agent_version = %version,
            services = ?services,
            "Log scaling agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Log scaling agent shutting down"
        );
    }

    /// Per-tick report of the window metrics and what was done with them
    pub fn log_tick_completed(
        &self,
        service: &str,
        correlation_id: &str,
        metrics: &WindowMetrics,
        replicas: u32,
        outcome: &str,
    ) {
        info!(
            event = "tick_completed",
            instance = %self.instance,
            service = %service,
            correlation_id = %correlation_id,
            completed = metrics.completed_count,
            active = metrics.active_count,
            arrived = metrics.total_arrived,
            errors = metrics.error_count,
            mean_latency_seconds = metrics.mean_latency_seconds,
            arrival_rate = metrics.arrival_rate,
            throughput = metrics.throughput,
            cpu_utilization = ?metrics.cpu_utilization,
            replicas = replicas,
            outcome = %outcome,
            "Tick completed"
        );
    }

    pub fn log_service_skipped(
        &self,
        service: &str,
        correlation_id: &str,
        stage: &str,
        error: &ScalerError,
    ) {
        warn!(
            event = "service_skipped",
            instance = %self.instance,
            service = %service,
            correlation_id = %correlation_id,
            stage = %stage,
            kind = error.kind(),
            error = %error,
            "Skipping service this tick"
        );
    }

    pub fn log_policy_unreachable(&self, service: &str, correlation_id: &str, error: &ScalerError) {
        warn!(
            event = "policy_unreachable",
            instance = %self.instance,
            service = %service,
            correlation_id = %correlation_id,
            error = %error,
            "Policy unavailable, holding current replica count"
        );
    }

    pub fn log_actuation_failed(
        &self,
        service: &str,
        correlation_id: &str,
        target: u32,
        error: &ScalerError,
    ) {
        warn!(
            event = "actuation_failed",
            instance = %self.instance,
            service = %service,
            correlation_id = %correlation_id,
            target = target,
            error = %error,
            "Scale mutation failed, state left unchanged"
        );
    }

    pub fn log_persist_failed(&self, service: &str, error: &ScalerError) {
        warn!(
            event = "history_persist_failed",
            instance = %self.instance,
            service = %service,
            error = %error,
            "Failed to persist history"
        );
    }
}
