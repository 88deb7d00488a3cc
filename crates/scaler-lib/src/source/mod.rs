//! Log and metrics store adapters
//!
//! The control loop only depends on the [`LogSource`] and [`MetricsSource`]
//! traits. The HTTP implementations query Loki (`query_range`) and
//! Prometheus (instant query) with a bounded per-request timeout.

mod loki;
mod promql;

pub use loki::{parse_query_range, LokiLogSource, LOKI_QUERY_LIMIT};
pub use promql::{cpu_query, PrometheusMetricsSource};

use crate::config::ServiceScalingConfig;
use crate::error::{Result, ScalerError};
use crate::models::LogEvent;
use std::time::Duration;
use url::Url;

pub use async_trait::async_trait;

/// Source of raw request log lines
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Fetch every event of `service` within `[now - window, now]`
    async fn fetch_events(
        &self,
        service: &ServiceScalingConfig,
        window: Duration,
    ) -> Result<Vec<LogEvent>>;
}

/// Source of CPU utilization samples
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Most recent utilization sample in the window.
    ///
    /// `Ok(None)` means the store answered but had no sample, which is not
    /// the same as zero load.
    async fn fetch_utilization(
        &self,
        service: &ServiceScalingConfig,
        window: Duration,
    ) -> Result<Option<f64>>;
}

/// Parse a base URL so that relative joins append to its path
pub(crate) fn base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)
        .map_err(|e| ScalerError::ConfigInvalid(format!("invalid endpoint '{}': {}", raw, e)))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Build a reqwest client with the given timeout
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ScalerError::ConfigInvalid(format!("failed to create HTTP client: {}", e)))
}
