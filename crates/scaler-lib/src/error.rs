//! Error taxonomy for the control loop
//!
//! Every per-tick error is recovered inside the owning service loop. Only
//! `ConfigInvalid` is fatal, and only at startup.

use thiserror::Error;

/// Errors raised by the adapters and pipeline stages
#[derive(Debug, Error)]
pub enum ScalerError {
    /// Log store, metrics store or status endpoint failed or timed out
    #[error("{store} data unavailable for '{service}': {reason}")]
    DataUnavailable {
        store: &'static str,
        service: String,
        reason: String,
    },

    /// A log line that does not follow the request protocol
    #[error("malformed log line: {0}")]
    MalformedLogLine(String),

    /// A completion line with no recorded arrival
    #[error("completion for request {request_id} has no recorded arrival")]
    OrphanCompletion { request_id: u64 },

    /// The policy endpoint failed, timed out or answered garbage
    #[error("policy unreachable for '{service}': {reason}")]
    PolicyUnreachable { service: String, reason: String },

    /// The control plane rejected or did not confirm a scale mutation
    #[error("failed to scale '{service}' to {target} replicas: {reason}")]
    ActuationFailure {
        service: String,
        target: u32,
        reason: String,
    },

    /// Configuration that would make the loop's math undefined
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// History file I/O error
    #[error("history persistence failed: {0}")]
    Persistence(#[from] std::io::Error),

    /// History serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ScalerError {
    pub fn data_unavailable(
        store: &'static str,
        service: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::DataUnavailable {
            store,
            service: service.into(),
            reason: reason.to_string(),
        }
    }

    pub fn policy_unreachable(service: impl Into<String>, reason: impl ToString) -> Self {
        Self::PolicyUnreachable {
            service: service.into(),
            reason: reason.to_string(),
        }
    }

    pub fn actuation_failure(service: impl Into<String>, target: u32, reason: impl ToString) -> Self {
        Self::ActuationFailure {
            service: service.into(),
            target,
            reason: reason.to_string(),
        }
    }

    /// Short label used for metrics and structured log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataUnavailable { .. } => "data_unavailable",
            Self::MalformedLogLine(_) => "malformed_log_line",
            Self::OrphanCompletion { .. } => "orphan_completion",
            Self::PolicyUnreachable { .. } => "policy_unreachable",
            Self::ActuationFailure { .. } => "actuation_failure",
            Self::ConfigInvalid(_) => "config_invalid",
            Self::Persistence(_) => "persistence",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Whether the error must stop the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConfigInvalid(_))
    }
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, ScalerError>;
