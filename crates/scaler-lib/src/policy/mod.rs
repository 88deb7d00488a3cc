//! Scaling policy clients
//!
//! A policy turns an [`Observation`] into a target replica count. The
//! control loop treats any failure, timeout or nonsensical answer as
//! "hold": the current replica count is kept.

mod http;

pub use http::HttpPolicyClient;

use crate::error::Result;
use crate::models::Observation;
use async_trait::async_trait;

/// External decision function
#[async_trait]
pub trait PolicyClient: Send + Sync {
    /// Ask for a target replica count. The result is always at least 1.
    async fn decide(&self, service: &str, observation: &Observation) -> Result<u32>;

    /// Liveness probe for the policy endpoint
    async fn health_check(&self) -> Result<()>;
}
