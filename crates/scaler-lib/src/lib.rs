//! Log-derived autoscaling control loop
//!
//! This crate provides the core functionality for:
//! - Querying request logs and CPU samples from external stores
//! - Reconstructing per-request intervals from log lines
//! - Aggregating windowed service metrics into a bounded observation
//! - Asking an external policy for a replica count and actuating it
//! - Health checks and observability

pub mod actuator;
pub mod config;
pub mod control;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod observation;
pub mod policy;
pub mod source;
pub mod timeline;

pub use config::{Endpoints, RawServiceConfig, ScalerConfig, ServiceScalingConfig};
pub use error::{Result, ScalerError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ScalerMetrics, StructuredLogger};
