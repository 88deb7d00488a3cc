//! Prometheus CPU utilization source

use super::{http_client, MetricsSource};
use crate::config::ServiceScalingConfig;
use crate::error::{Result, ScalerError};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

const STORE: &str = "prometheus";

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<VectorSample>,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    /// `[unix_seconds, "value"]`
    value: (f64, String),
}

/// CPU rate expression averaged by the source over all matching pods
pub fn cpu_query(pod_pattern: &str, window: Duration) -> String {
    format!(
        r#"rate(container_cpu_usage_seconds_total{{pod=~"{}"}}[{}s])"#,
        pod_pattern,
        window.as_secs().max(1)
    )
}

/// Metrics source backed by the Prometheus instant query API
pub struct PrometheusMetricsSource {
    client: reqwest::Client,
    base_url: Url,
}

impl PrometheusMetricsSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: super::base_url(base_url)?,
        })
    }
}

#[async_trait]
impl MetricsSource for PrometheusMetricsSource {
    async fn fetch_utilization(
        &self,
        service: &ServiceScalingConfig,
        window: Duration,
    ) -> Result<Option<f64>> {
        let name = service.name();
        let unavailable = |reason: String| ScalerError::data_unavailable(STORE, name, reason);

        let url = self
            .base_url
            .join("api/v1/query")
            .map_err(|e| unavailable(e.to_string()))?;

        let response = self
            .client
            .get(url)
            .query(&[("query", cpu_query(service.pod_pattern(), window))])
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(unavailable(format!("API error ({}): {}", status, body)));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| unavailable(format!("malformed response: {}", e)))?;

        if body.status != "success" {
            return Err(unavailable(
                body.error.unwrap_or_else(|| format!("status '{}'", body.status)),
            ));
        }

        let samples: Vec<f64> = body
            .data
            .map(|d| d.result)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|s| s.value.1.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .collect();

        if samples.is_empty() {
            debug!(service = %name, "No CPU samples in window");
            return Ok(None);
        }

        let average = samples.iter().sum::<f64>() / samples.len() as f64;
        debug!(
            service = %name,
            pods = samples.len(),
            utilization = average,
            "Fetched CPU utilization"
        );

        Ok(Some(average))
    }
}
