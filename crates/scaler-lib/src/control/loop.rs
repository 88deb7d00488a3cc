//! Per-service control loop
//!
//! Each monitored service gets one [`ServiceLoop`], driven by its own fixed
//! interval timer. A tick walks `Idle -> Collecting -> Deciding -> Actuating
//! -> Idle`; every external call is bounded by the stage timeout and every
//! failure is recovered inside the tick.

use super::ServiceRegistry;
use crate::actuator::{Actuator, ApplyOutcome};
use crate::config::ServiceScalingConfig;
use crate::error::{Result, ScalerError};
use crate::health::{components, HealthRegistry};
use crate::models::ScalingDecision;
use crate::observability::{ScalerMetrics, StructuredLogger};
use crate::observation::{ObservationBuilder, WindowAggregator};
use crate::policy::PolicyClient;
use crate::source::{LogSource, MetricsSource};
use crate::timeline::reconstruct;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, info_span, Instrument};

/// Pipeline phase of a service loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopPhase {
    Idle,
    Collecting,
    Deciding,
    Actuating,
}

impl LoopPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Collecting => "collecting",
            Self::Deciding => "deciding",
            Self::Actuating => "actuating",
        }
    }
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Stopped before the policy was asked
    Skipped { stage: &'static str },
    /// Policy gave no usable answer; replica count kept
    Held { replicas: u32 },
    Unchanged { replicas: u32 },
    Scaled { from: u32, to: u32 },
    /// The control plane rejected the mutation; replica count kept
    ActuationFailed { replicas: u32 },
}

impl TickOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped { .. } => "skipped",
            Self::Held { .. } => "held",
            Self::Unchanged { .. } => "unchanged",
            Self::Scaled { .. } => "scaled",
            Self::ActuationFailed { .. } => "actuation_failed",
        }
    }
}

/// Timing knobs shared by every service loop
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub tick_interval: Duration,
    pub window: Duration,
    /// Upper bound for any single external call
    pub stage_timeout: Duration,
}

/// External collaborators of a service loop
#[derive(Clone)]
pub struct LoopAdapters {
    pub logs: Arc<dyn LogSource>,
    pub metrics: Arc<dyn MetricsSource>,
    pub policy: Arc<dyn PolicyClient>,
}

/// Shared observability handles
#[derive(Clone)]
pub struct LoopObservers {
    pub registry: Arc<ServiceRegistry>,
    pub health: HealthRegistry,
    pub metrics: ScalerMetrics,
    pub logger: StructuredLogger,
}

/// Run `fut`, turning an elapsed deadline into `on_timeout()`
async fn within<T, F>(
    limit: Duration,
    fut: F,
    on_timeout: impl FnOnce() -> ScalerError,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}

/// Control loop owning one service's replica count
pub struct ServiceLoop {
    config: ServiceScalingConfig,
    settings: LoopSettings,
    adapters: LoopAdapters,
    observers: LoopObservers,
    actuator: Actuator,
    aggregator: WindowAggregator,
    builder: ObservationBuilder,
    ticks: u64,
    last_outcome: Option<TickOutcome>,
}

impl ServiceLoop {
    pub fn new(
        config: ServiceScalingConfig,
        settings: LoopSettings,
        adapters: LoopAdapters,
        observers: LoopObservers,
        actuator: Actuator,
    ) -> Self {
        Self {
            aggregator: WindowAggregator::new(settings.window),
            builder: ObservationBuilder::new(config.clone()),
            config,
            settings,
            adapters,
            observers,
            actuator,
            ticks: 0,
            last_outcome: None,
        }
    }

    pub fn service(&self) -> &str {
        self.config.name()
    }

    pub fn actuator(&self) -> &Actuator {
        &self.actuator
    }

    /// Tick until a shutdown signal arrives
    ///
    /// A tick in progress when the signal arrives runs to completion. Ticks
    /// that overrun the interval delay the next one instead of overlapping.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            service = %self.config.name(),
            interval_secs = self.settings.tick_interval.as_secs(),
            window_secs = self.settings.window.as_secs(),
            "Starting control loop"
        );

        let mut ticker = interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_tick().await;
                }
                _ = shutdown.recv() => {
                    info!(service = %self.config.name(), "Shutting down control loop");
                    break;
                }
            }
        }
    }

    /// Run one full pipeline pass
    pub async fn run_tick(&mut self) -> TickOutcome {
        self.ticks += 1;
        let correlation_id = format!("{}-{}", self.config.name(), self.ticks);
        let span = info_span!(
            "tick",
            service = %self.config.name(),
            correlation_id = %correlation_id
        );

        let start = Instant::now();
        let outcome = self.tick(&correlation_id).instrument(span).await;

        let name = self.config.name().to_string();
        self.observers
            .metrics
            .observe_tick_latency(&name, start.elapsed().as_secs_f64());
        self.last_outcome = Some(outcome);
        self.publish(LoopPhase::Idle);

        outcome
    }

    async fn tick(&mut self, correlation_id: &str) -> TickOutcome {
        let name = self.config.name().to_string();
        let limit = self.settings.stage_timeout;

        // Collecting
        self.publish(LoopPhase::Collecting);

        let refreshed = within(limit, self.actuator.refresh(), || {
            ScalerError::data_unavailable("control_plane", &name, "status query timed out")
        })
        .await;
        self.observers
            .health
            .record(components::CONTROL_PLANE, &refreshed)
            .await;
        let current = match refreshed {
            Ok(replicas) => replicas,
            Err(e) => return self.skip(correlation_id, "status", &e),
        };
        self.observers.metrics.set_current_replicas(&name, current);

        let (events, utilization) = tokio::join!(
            within(
                limit,
                self.adapters.logs.fetch_events(&self.config, self.settings.window),
                || ScalerError::data_unavailable("loki", &name, "log query timed out"),
            ),
            within(
                limit,
                self.adapters
                    .metrics
                    .fetch_utilization(&self.config, self.settings.window),
                || ScalerError::data_unavailable("prometheus", &name, "metrics query timed out"),
            ),
        );
        self.observers
            .health
            .record(components::LOG_SOURCE, &events)
            .await;
        self.observers
            .health
            .record(components::METRICS_SOURCE, &utilization)
            .await;

        let events = match events {
            Ok(events) => events,
            Err(e) => return self.skip(correlation_id, "logs", &e),
        };
        let utilization = match utilization {
            Ok(value) => value,
            Err(e) => return self.skip(correlation_id, "metrics", &e),
        };

        let timeline = reconstruct(&name, events);
        self.observers
            .metrics
            .add_orphan_completions(&name, timeline.orphan_completions().len());
        let window_metrics = self
            .aggregator
            .aggregate(&name, &timeline, utilization, Utc::now());

        debug!(
            completed = window_metrics.completed_count,
            active = window_metrics.active_count,
            malformed = timeline.malformed_lines(),
            "Window aggregated"
        );

        // Deciding
        self.publish(LoopPhase::Deciding);

        let observation = match self.builder.build(&window_metrics, current) {
            Ok(observation) => observation,
            Err(e) => return self.skip(correlation_id, "observation", &e),
        };
        self.observers.metrics.set_observation(&name, &observation);

        let decided = within(
            limit,
            self.adapters.policy.decide(&name, &observation),
            || ScalerError::policy_unreachable(&name, "decision timed out"),
        )
        .await;
        self.observers
            .health
            .record(components::POLICY, &decided)
            .await;

        let target = match decided {
            Ok(target) => target,
            Err(e) => {
                self.observers.metrics.inc_decision(&name, "held");
                self.observers.metrics.inc_stage_error(&name, "policy", &e);
                self.observers
                    .logger
                    .log_policy_unreachable(&name, correlation_id, &e);
                let outcome = TickOutcome::Held { replicas: current };
                self.observers.logger.log_tick_completed(
                    &name,
                    correlation_id,
                    &window_metrics,
                    current,
                    outcome.label(),
                );
                return outcome;
            }
        };
        self.observers.metrics.inc_decision(&name, "decided");

        // Actuating
        self.publish(LoopPhase::Actuating);

        let decision = ScalingDecision {
            service: name.clone(),
            target_replicas: target,
            issued_at: Utc::now(),
            correlation_id: correlation_id.to_string(),
        };

        let applied = within(
            limit,
            self.actuator.apply(&decision, &window_metrics, &observation),
            || ScalerError::actuation_failure(&name, target, "scale request timed out"),
        )
        .await;
        self.observers
            .health
            .record(components::CONTROL_PLANE, &applied)
            .await;

        let outcome = match applied {
            Ok(ApplyOutcome::Unchanged { replicas }) => TickOutcome::Unchanged { replicas },
            Ok(ApplyOutcome::Scaled { from, to }) => {
                self.observers.metrics.inc_scale_action(&name, from, to);
                self.observers.metrics.set_current_replicas(&name, to);
                TickOutcome::Scaled { from, to }
            }
            Err(e) => {
                self.observers
                    .metrics
                    .inc_stage_error(&name, "actuation", &e);
                self.observers
                    .logger
                    .log_actuation_failed(&name, correlation_id, target, &e);
                TickOutcome::ActuationFailed { replicas: current }
            }
        };

        if !matches!(outcome, TickOutcome::ActuationFailed { .. }) {
            if let Err(e) = self.actuator.persist().await {
                self.observers.metrics.inc_stage_error(&name, "persist", &e);
                self.observers.logger.log_persist_failed(&name, &e);
            }
        }

        self.observers.logger.log_tick_completed(
            &name,
            correlation_id,
            &window_metrics,
            self.actuator.current_replicas().unwrap_or(current),
            outcome.label(),
        );

        outcome
    }

    fn skip(&self, correlation_id: &str, stage: &'static str, error: &ScalerError) -> TickOutcome {
        let name = self.config.name();
        self.observers.metrics.inc_stage_error(name, stage, error);
        self.observers
            .logger
            .log_service_skipped(name, correlation_id, stage, error);
        TickOutcome::Skipped { stage }
    }

    fn publish(&self, phase: LoopPhase) {
        let state = self.actuator.state();
        self.observers.registry.publish(super::ServiceSnapshot {
            service: self.config.name().to_string(),
            app: self.config.control_plane_app().to_string(),
            phase,
            ticks: self.ticks,
            current_replicas: state.current_replicas,
            last_outcome: self.last_outcome.map(|o| o.label().to_string()),
            last_decision: state.last_decision.clone(),
            last_entry: state.history.last().cloned(),
            updated_at: Utc::now(),
        });
    }
}
