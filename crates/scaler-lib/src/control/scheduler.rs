//! Control loop construction and spawning

use super::r#loop::{LoopAdapters, LoopObservers, LoopSettings, ServiceLoop};
use super::ServiceRegistry;
use crate::actuator::{Actuator, ClusterScaler, GatewayScaler, HistoryStore, JsonFileHistoryStore};
use crate::config::ScalerConfig;
use crate::health::HealthRegistry;
use crate::observability::{ScalerMetrics, StructuredLogger};
use crate::policy::{HttpPolicyClient, PolicyClient};
use crate::source::{LogSource, LokiLogSource, MetricsSource, PrometheusMetricsSource};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

/// Set of service loops ready to run
pub struct Scheduler {
    loops: Vec<ServiceLoop>,
    registry: Arc<ServiceRegistry>,
}

impl Scheduler {
    pub fn registry(&self) -> Arc<ServiceRegistry> {
        self.registry.clone()
    }

    pub fn services(&self) -> Vec<&str> {
        self.loops.iter().map(|l| l.service()).collect()
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Take the loops for manual driving
    pub fn into_loops(self) -> Vec<ServiceLoop> {
        self.loops
    }

    /// Spawn one task per service; each stops on the shutdown broadcast
    pub fn spawn(self, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        self.loops
            .into_iter()
            .map(|service_loop| {
                let rx = shutdown.subscribe();
                tokio::spawn(service_loop.run(rx))
            })
            .collect()
    }
}

/// Builder for the per-service control loops
pub struct ControlLoopBuilder {
    config: ScalerConfig,
    logs: Option<Arc<dyn LogSource>>,
    metrics: Option<Arc<dyn MetricsSource>>,
    policy: Option<Arc<dyn PolicyClient>>,
    scaler: Option<Arc<dyn ClusterScaler>>,
    store: Option<Arc<dyn HistoryStore>>,
    registry: Arc<ServiceRegistry>,
    health: HealthRegistry,
    logger: StructuredLogger,
}

impl ControlLoopBuilder {
    pub fn new(config: ScalerConfig) -> Self {
        Self {
            config,
            logs: None,
            metrics: None,
            policy: None,
            scaler: None,
            store: None,
            registry: Arc::new(ServiceRegistry::new()),
            health: HealthRegistry::new(),
            logger: StructuredLogger::new("log-agent"),
        }
    }

    /// Use the HTTP adapters for every endpoint in the configuration
    pub fn http_adapters(mut self) -> Result<Self> {
        let timeout = self.config.request_timeout();
        let endpoints = self.config.endpoints.clone();

        self.logs = Some(Arc::new(
            LokiLogSource::new(&endpoints.loki, timeout).context("Invalid log store endpoint")?,
        ));
        self.metrics = Some(Arc::new(
            PrometheusMetricsSource::new(&endpoints.prometheus, timeout)
                .context("Invalid metrics store endpoint")?,
        ));
        self.policy = Some(Arc::new(
            HttpPolicyClient::new(&endpoints.policy, timeout)
                .context("Invalid policy endpoint")?,
        ));
        self.scaler = Some(Arc::new(
            GatewayScaler::new(&endpoints.control_plane, timeout)
                .context("Invalid control plane endpoint")?,
        ));
        self.store = Some(Arc::new(JsonFileHistoryStore::new(&self.config.history_dir)));
        Ok(self)
    }

    pub fn log_source(mut self, logs: Arc<dyn LogSource>) -> Self {
        self.logs = Some(logs);
        self
    }

    pub fn metrics_source(mut self, metrics: Arc<dyn MetricsSource>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn policy(mut self, policy: Arc<dyn PolicyClient>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn scaler(mut self, scaler: Arc<dyn ClusterScaler>) -> Self {
        self.scaler = Some(scaler);
        self
    }

    pub fn history_store(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Share an existing registry, e.g. with the API server
    pub fn registry(mut self, registry: Arc<ServiceRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Validate the configuration, claim every service and load histories
    pub async fn build(self) -> Result<Scheduler> {
        self.config.validate().context("Invalid configuration")?;

        let logs = self
            .logs
            .ok_or_else(|| anyhow::anyhow!("Log source is required"))?;
        let metrics = self
            .metrics
            .ok_or_else(|| anyhow::anyhow!("Metrics source is required"))?;
        let policy = self
            .policy
            .ok_or_else(|| anyhow::anyhow!("Policy client is required"))?;
        let scaler = self
            .scaler
            .ok_or_else(|| anyhow::anyhow!("Cluster scaler is required"))?;
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("History store is required"))?;

        let settings = LoopSettings {
            tick_interval: self.config.tick_interval(),
            window: self.config.window(),
            stage_timeout: self.config.request_timeout(),
        };
        let adapters = LoopAdapters {
            logs,
            metrics,
            policy,
        };
        let observers = LoopObservers {
            registry: self.registry.clone(),
            health: self.health.clone(),
            metrics: ScalerMetrics::new(),
            logger: self.logger.clone(),
        };

        let mut loops = Vec::with_capacity(self.config.services.len());
        for service in &self.config.services {
            let app = service.control_plane_app();
            self.registry.claim(service.name(), app)?;

            let history = store
                .load(app)
                .await
                .with_context(|| format!("Failed to load history for '{}'", app))?;
            info!(
                service = %service.name(),
                app = %app,
                entries = history.history.len(),
                "Loaded service history"
            );

            let actuator = Actuator::new(
                service.name(),
                app,
                scaler.clone(),
                store.clone(),
                history,
            );
            loops.push(ServiceLoop::new(
                service.clone(),
                settings,
                adapters.clone(),
                observers.clone(),
                actuator,
            ));
        }

        observers.metrics.set_services_monitored(loops.len());

        Ok(Scheduler {
            loops,
            registry: self.registry,
        })
    }
}
