//! Replica actuation and per-service state
//!
//! The [`Actuator`] owns a service's [`ServiceState`]. It is the single
//! writer of the replica count it tracks: a scale mutation is issued only
//! when the target differs from the current count, and local state changes
//! only after the control plane confirms the mutation.

mod gateway;
mod history;

pub use gateway::{AppStatus, GatewayScaler};
pub use history::{HistoryEntry, HistoryStore, JsonFileHistoryStore, ServiceHistory};

use crate::error::{Result, ScalerError};
use crate::models::{Observation, ScalingDecision, WindowMetrics};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Replica counts reported by the control plane for one app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaStatus {
    /// Desired replicas
    pub instances: u32,
    /// Replicas currently available
    pub available: u32,
}

/// Cluster control plane
#[async_trait]
pub trait ClusterScaler: Send + Sync {
    /// Set the replica count of `app`. Errors are `ActuationFailure`.
    async fn scale(&self, app: &str, instances: u32) -> Result<()>;

    /// Current replica status of `app`. Errors are `DataUnavailable`.
    async fn status(&self, app: &str) -> Result<ReplicaStatus>;

    /// Scaler name (for logging)
    fn name(&self) -> &str;
}

/// Result of applying a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Target equals current; no external call was made
    Unchanged { replicas: u32 },
    /// One scale mutation succeeded
    Scaled { from: u32, to: u32 },
}

impl ApplyOutcome {
    pub fn replicas(&self) -> u32 {
        match self {
            Self::Unchanged { replicas } => *replicas,
            Self::Scaled { to, .. } => *to,
        }
    }
}

/// Mutable state of one monitored service
#[derive(Debug, Clone)]
pub struct ServiceState {
    /// Last replica count confirmed by the control plane
    pub current_replicas: Option<u32>,
    pub last_decision: Option<ScalingDecision>,
    pub history: ServiceHistory,
}

/// Applies scaling decisions for a single service
pub struct Actuator {
    service: String,
    app: String,
    scaler: Arc<dyn ClusterScaler>,
    store: Arc<dyn HistoryStore>,
    state: ServiceState,
    started_at: Instant,
}

impl Actuator {
    /// `app` is the control-plane name of the service, `history` the
    /// previously persisted document (possibly empty)
    pub fn new(
        service: impl Into<String>,
        app: impl Into<String>,
        scaler: Arc<dyn ClusterScaler>,
        store: Arc<dyn HistoryStore>,
        history: ServiceHistory,
    ) -> Self {
        Self {
            service: service.into(),
            app: app.into(),
            scaler,
            store,
            state: ServiceState {
                current_replicas: None,
                last_decision: None,
                history,
            },
            started_at: Instant::now(),
        }
    }

    pub fn state(&self) -> &ServiceState {
        &self.state
    }

    pub fn current_replicas(&self) -> Option<u32> {
        self.state.current_replicas
    }

    /// Re-read the replica count from the control plane
    ///
    /// The status endpoint is the source of truth; the cached value is
    /// replaced on every successful call.
    pub async fn refresh(&mut self) -> Result<u32> {
        let status = self.scaler.status(&self.app).await?;
        self.state.current_replicas = Some(status.instances);
        Ok(status.instances)
    }

    /// Apply `decision` and append a history entry on success
    ///
    /// Issues zero external calls when the target equals the current count.
    /// On failure the state, including history, is left untouched.
    pub async fn apply(
        &mut self,
        decision: &ScalingDecision,
        metrics: &WindowMetrics,
        observation: &Observation,
    ) -> Result<ApplyOutcome> {
        let target = decision.target_replicas;
        let current = self.state.current_replicas.ok_or_else(|| {
            ScalerError::actuation_failure(&self.service, target, "current replica count unknown")
        })?;

        let outcome = if target == current {
            ApplyOutcome::Unchanged { replicas: current }
        } else {
            self.scaler.scale(&self.app, target).await?;
            info!(
                event = "scale_applied",
                service = %self.service,
                app = %self.app,
                scaler = self.scaler.name(),
                from = current,
                to = target,
                correlation_id = %decision.correlation_id,
                "Scaled service"
            );
            ApplyOutcome::Scaled {
                from: current,
                to: target,
            }
        };

        self.state.current_replicas = Some(outcome.replicas());
        self.state.last_decision = Some(decision.clone());
        self.state.history.history.push(HistoryEntry {
            timestamp: Utc::now(),
            elapsed_seconds: self.started_at.elapsed().as_secs_f64(),
            instances: outcome.replicas(),
            cpu_usage: metrics.cpu_utilization.unwrap_or_default(),
            requests_per_second: metrics.throughput,
            mean_request_time: metrics.mean_latency_seconds,
            total_arrived_requests: metrics.total_arrived,
            workload: observation.norm_workload,
        });

        Ok(outcome)
    }

    /// Write the full history document
    pub async fn persist(&self) -> Result<()> {
        self.store.save(&self.state.history).await
    }
}
