//! Validated scaling configuration
//!
//! Per-service settings are deserialized into [`RawServiceConfig`] and
//! converted into [`ServiceScalingConfig`] through `TryFrom`, so an entry with
//! undefined math (zero threshold, zero demand, zero clip bound) never exists
//! past startup. [`ScalerConfig::validate`] adds the cross-service checks.

use crate::error::{Result, ScalerError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Default Loki selector template; `{service}` is replaced by the service name
pub const DEFAULT_LOG_SELECTOR: &str = r#"{logger="werkzeug", application="{service}"}"#;

/// Per-service settings as they appear in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawServiceConfig {
    pub name: String,

    /// Response time SLA in seconds
    #[serde(default = "default_response_time_threshold")]
    pub response_time_threshold_secs: f64,

    /// Expected service time of one request on one replica, in seconds
    #[serde(default = "default_demand")]
    pub demand_secs: f64,

    /// Requests per second mapped to a normalized workload of 1.0
    #[serde(default = "default_max_workload")]
    pub max_workload: f64,

    #[serde(default = "default_max_replicas")]
    pub max_replicas: u32,

    #[serde(default = "default_pressure_clip")]
    pub pressure_clip: f64,

    #[serde(default = "default_queue_clip")]
    pub queue_clip: f64,

    /// Loki stream selector; defaults to [`DEFAULT_LOG_SELECTOR`]
    #[serde(default)]
    pub log_selector: Option<String>,

    /// Regex matched against pod names in the CPU query
    #[serde(default)]
    pub pod_pattern: Option<String>,

    /// Name the control plane knows this service by
    #[serde(default)]
    pub control_plane_app: Option<String>,
}

fn default_response_time_threshold() -> f64 {
    0.5
}

fn default_demand() -> f64 {
    1.0
}

fn default_max_workload() -> f64 {
    10.0
}

fn default_max_replicas() -> u32 {
    3
}

fn default_pressure_clip() -> f64 {
    3.0
}

fn default_queue_clip() -> f64 {
    3.0
}

impl RawServiceConfig {
    /// Settings for `name` with every tunable at its default
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response_time_threshold_secs: default_response_time_threshold(),
            demand_secs: default_demand(),
            max_workload: default_max_workload(),
            max_replicas: default_max_replicas(),
            pressure_clip: default_pressure_clip(),
            queue_clip: default_queue_clip(),
            log_selector: None,
            pod_pattern: None,
            control_plane_app: None,
        }
    }
}

/// Immutable, validated per-service scaling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawServiceConfig", into = "RawServiceConfig")]
pub struct ServiceScalingConfig {
    name: String,
    response_time_threshold: f64,
    demand: f64,
    max_workload: f64,
    max_replicas: u32,
    pressure_clip: f64,
    queue_clip: f64,
    log_selector: String,
    pod_pattern: String,
    control_plane_app: String,
}

impl TryFrom<RawServiceConfig> for ServiceScalingConfig {
    type Error = ScalerError;

    fn try_from(raw: RawServiceConfig) -> Result<Self> {
        let name = raw.name.trim().to_string();
        if name.is_empty() {
            return Err(ScalerError::ConfigInvalid(
                "service name must not be empty".to_string(),
            ));
        }

        let positive = |field: &str, value: f64| -> Result<f64> {
            if value.is_finite() && value > 0.0 {
                Ok(value)
            } else {
                Err(ScalerError::ConfigInvalid(format!(
                    "service '{}': {} must be a positive number, got {}",
                    name, field, value
                )))
            }
        };

        let response_time_threshold =
            positive("response_time_threshold_secs", raw.response_time_threshold_secs)?;
        let demand = positive("demand_secs", raw.demand_secs)?;
        let max_workload = positive("max_workload", raw.max_workload)?;
        let pressure_clip = positive("pressure_clip", raw.pressure_clip)?;
        let queue_clip = positive("queue_clip", raw.queue_clip)?;

        if raw.max_replicas == 0 {
            return Err(ScalerError::ConfigInvalid(format!(
                "service '{}': max_replicas must be at least 1",
                name
            )));
        }

        let log_selector = raw
            .log_selector
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_SELECTOR.replace("{service}", &name));
        let pod_pattern = raw
            .pod_pattern
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| format!("{}.*", name));
        let control_plane_app = raw
            .control_plane_app
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| name.clone());

        Ok(Self {
            name,
            response_time_threshold,
            demand,
            max_workload,
            max_replicas: raw.max_replicas,
            pressure_clip,
            queue_clip,
            log_selector,
            pod_pattern,
            control_plane_app,
        })
    }
}

impl From<ServiceScalingConfig> for RawServiceConfig {
    fn from(config: ServiceScalingConfig) -> Self {
        Self {
            name: config.name,
            response_time_threshold_secs: config.response_time_threshold,
            demand_secs: config.demand,
            max_workload: config.max_workload,
            max_replicas: config.max_replicas,
            pressure_clip: config.pressure_clip,
            queue_clip: config.queue_clip,
            log_selector: Some(config.log_selector),
            pod_pattern: Some(config.pod_pattern),
            control_plane_app: Some(config.control_plane_app),
        }
    }
}

impl ServiceScalingConfig {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn response_time_threshold(&self) -> f64 {
        self.response_time_threshold
    }

    pub fn demand(&self) -> f64 {
        self.demand
    }

    pub fn max_workload(&self) -> f64 {
        self.max_workload
    }

    pub fn max_replicas(&self) -> u32 {
        self.max_replicas
    }

    pub fn pressure_clip(&self) -> f64 {
        self.pressure_clip
    }

    pub fn queue_clip(&self) -> f64 {
        self.queue_clip
    }

    pub fn log_selector(&self) -> &str {
        &self.log_selector
    }

    pub fn pod_pattern(&self) -> &str {
        &self.pod_pattern
    }

    pub fn control_plane_app(&self) -> &str {
        &self.control_plane_app
    }
}

/// Endpoints of the external collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(default = "default_loki_url")]
    pub loki: String,
    #[serde(default = "default_prometheus_url")]
    pub prometheus: String,
    #[serde(default = "default_policy_url")]
    pub policy: String,
    #[serde(default = "default_control_plane_url")]
    pub control_plane: String,
}

fn default_loki_url() -> String {
    "http://localhost:3100".to_string()
}

fn default_prometheus_url() -> String {
    "http://localhost:9090".to_string()
}

fn default_policy_url() -> String {
    "http://localhost:5001".to_string()
}

fn default_control_plane_url() -> String {
    "http://localhost:5000".to_string()
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            loki: default_loki_url(),
            prometheus: default_prometheus_url(),
            policy: default_policy_url(),
            control_plane: default_control_plane_url(),
        }
    }
}

/// Process-wide scaler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalerConfig {
    /// Control loop tick interval in seconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Trailing window queried each tick, in seconds
    #[serde(default = "default_window")]
    pub window_secs: u64,

    /// Upper bound for every external call, in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Directory holding one history document per service
    #[serde(default = "default_history_dir")]
    pub history_dir: PathBuf,

    #[serde(default)]
    pub endpoints: Endpoints,

    #[serde(default)]
    pub services: Vec<ServiceScalingConfig>,
}

fn default_tick_interval() -> u64 {
    5
}

fn default_window() -> u64 {
    600
}

fn default_request_timeout() -> u64 {
    3000
}

fn default_history_dir() -> PathBuf {
    PathBuf::from("history")
}

impl ScalerConfig {
    /// Configuration with default timings for the given services
    pub fn with_services(services: Vec<ServiceScalingConfig>) -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            window_secs: default_window(),
            request_timeout_ms: default_request_timeout(),
            history_dir: default_history_dir(),
            endpoints: Endpoints::default(),
            services,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Cross-service checks; any failure must abort startup
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_secs == 0 {
            return Err(ScalerError::ConfigInvalid(
                "tick_interval_secs must be positive".to_string(),
            ));
        }
        if self.window_secs == 0 {
            return Err(ScalerError::ConfigInvalid(
                "window_secs must be positive".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(ScalerError::ConfigInvalid(
                "request_timeout_ms must be positive".to_string(),
            ));
        }
        if self.services.is_empty() {
            return Err(ScalerError::ConfigInvalid(
                "at least one service must be configured".to_string(),
            ));
        }

        let mut names = HashSet::new();
        let mut apps = HashSet::new();
        for service in &self.services {
            if !names.insert(service.name()) {
                return Err(ScalerError::ConfigInvalid(format!(
                    "service '{}' is configured more than once",
                    service.name()
                )));
            }
            // Two services mapped to one control-plane app would be two owners
            if !apps.insert(service.control_plane_app()) {
                return Err(ScalerError::ConfigInvalid(format!(
                    "control-plane app '{}' is owned by more than one service",
                    service.control_plane_app()
                )));
            }
        }

        Ok(())
    }
}
