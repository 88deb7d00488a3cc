//! Core data models for the control loop

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request identifier carried by the log protocol
pub type RequestId = u64;

/// A raw log line fetched from the log store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub service: String,
    pub timestamp_nanos: i64,
    pub text: String,
}

impl LogEvent {
    pub fn new(service: impl Into<String>, timestamp_nanos: i64, text: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            timestamp_nanos,
            text: text.into(),
        }
    }
}

/// Arrival-to-completion span of one request within a window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInterval {
    pub request_id: RequestId,
    pub service: String,
    pub arrived_at: Option<i64>,
    pub completed_at: Option<i64>,
    /// HTTP status reported on the completion line
    pub status: Option<u16>,
}

impl RequestInterval {
    pub fn new(request_id: RequestId, service: impl Into<String>) -> Self {
        Self {
            request_id,
            service: service.into(),
            arrived_at: None,
            completed_at: None,
            status: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.arrived_at.is_some() && self.completed_at.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.arrived_at.is_some() && self.completed_at.is_none()
    }

    /// Latency in seconds, if the request completed
    pub fn latency_seconds(&self) -> Option<f64> {
        match (self.arrived_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start) as f64 / 1e9),
            _ => None,
        }
    }
}

/// Summary of one service over one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowMetrics {
    pub service: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub completed_count: usize,
    pub active_count: usize,
    pub total_arrived: usize,
    /// Completions reporting a 5xx status
    pub error_count: usize,
    pub mean_latency_seconds: f64,
    /// Arrivals per second
    pub arrival_rate: f64,
    /// Completions per second
    pub throughput: f64,
    /// `None` when the metrics store had no sample
    pub cpu_utilization: Option<f64>,
}

/// Bounded feature vector sent to the policy
///
/// Serialized with the field names the policy endpoint expects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(rename = "n_instances")]
    pub norm_instances: f64,
    #[serde(rename = "workload")]
    pub norm_workload: f64,
    pub utilization: f64,
    #[serde(rename = "pressure")]
    pub norm_pressure: f64,
    #[serde(rename = "queue_length_dominant")]
    pub norm_queue_length_dominant: f64,
}

impl Observation {
    /// Feature names and values, in wire order
    pub fn features(&self) -> [(&'static str, f64); 5] {
        [
            ("n_instances", self.norm_instances),
            ("workload", self.norm_workload),
            ("utilization", self.utilization),
            ("pressure", self.norm_pressure),
            ("queue_length_dominant", self.norm_queue_length_dominant),
        ]
    }
}

/// A target replica count obtained from the policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingDecision {
    pub service: String,
    pub target_replicas: u32,
    pub issued_at: DateTime<Utc>,
    /// Tick correlation ID of the loop that requested the decision
    pub correlation_id: String,
}
