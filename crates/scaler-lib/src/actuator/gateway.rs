//! HTTP scaling gateway client
//!
//! `POST /scale` with `{app, instances}` and `GET /scale-status`, which
//! returns a map `app -> {deployment, instances, available}`.

use super::{ClusterScaler, ReplicaStatus};
use crate::error::{Result, ScalerError};
use crate::source::{base_url, http_client};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

const STORE: &str = "control_plane";

#[derive(Debug, Serialize)]
struct ScaleRequest<'a> {
    app: &'a str,
    instances: u32,
}

#[derive(Debug, Deserialize)]
struct ScaleResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// One entry of the `/scale-status` map
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppStatus {
    #[serde(default)]
    pub deployment: Option<String>,
    pub instances: u32,
    #[serde(default)]
    pub available: u32,
}

/// Cluster scaler backed by the scaling gateway
pub struct GatewayScaler {
    client: reqwest::Client,
    base_url: Url,
}

impl GatewayScaler {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url(endpoint)?,
        })
    }

    /// Fetch the full status map
    pub async fn status_all(&self) -> Result<HashMap<String, AppStatus>> {
        let unavailable = |reason: String| ScalerError::data_unavailable(STORE, "*", reason);

        let url = self
            .base_url
            .join("scale-status")
            .map_err(|e| unavailable(e.to_string()))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(unavailable(format!("API error ({}): {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| unavailable(format!("malformed response: {}", e)))
    }
}

#[async_trait]
impl ClusterScaler for GatewayScaler {
    async fn scale(&self, app: &str, instances: u32) -> Result<()> {
        let failure = |reason: String| ScalerError::actuation_failure(app, instances, reason);

        let url = self
            .base_url
            .join("scale")
            .map_err(|e| failure(e.to_string()))?;

        let response = self
            .client
            .post(url)
            .json(&ScaleRequest { app, instances })
            .send()
            .await
            .map_err(|e| failure(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(failure(format!("API error ({}): {}", status, body)));
        }

        let body: ScaleResponse = response
            .json()
            .await
            .map_err(|e| failure(format!("malformed response: {}", e)))?;

        if !body.success {
            let reason = body
                .error
                .or(body.message)
                .unwrap_or_else(|| "gateway did not confirm the mutation".to_string());
            return Err(failure(reason));
        }

        Ok(())
    }

    async fn status(&self, app: &str) -> Result<ReplicaStatus> {
        let mut all = self.status_all().await.map_err(|e| match e {
            ScalerError::DataUnavailable { store, reason, .. } => {
                ScalerError::data_unavailable(store, app, reason)
            }
            other => other,
        })?;

        let entry = all.remove(app).ok_or_else(|| {
            ScalerError::data_unavailable(STORE, app, "app missing from scale status")
        })?;

        Ok(ReplicaStatus {
            instances: entry.instances,
            available: entry.available,
        })
    }

    fn name(&self) -> &str {
        "gateway"
    }
}
