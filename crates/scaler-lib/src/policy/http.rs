//! HTTP policy client

use super::PolicyClient;
use crate::error::{Result, ScalerError};
use crate::models::Observation;
use crate::source::{base_url, http_client};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Serialize)]
struct ActionRequest<'a> {
    observation: &'a Observation,
}

#[derive(Debug, Deserialize)]
struct ActionResponse {
    action: i64,
}

/// Policy served over HTTP: `POST /action` with `{"observation": {...}}`
pub struct HttpPolicyClient {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpPolicyClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url(endpoint)?,
        })
    }
}

#[async_trait]
impl PolicyClient for HttpPolicyClient {
    async fn decide(&self, service: &str, observation: &Observation) -> Result<u32> {
        let unreachable = |reason: String| ScalerError::policy_unreachable(service, reason);

        let url = self
            .base_url
            .join("action")
            .map_err(|e| unreachable(e.to_string()))?;

        let response = self
            .client
            .post(url)
            .json(&ActionRequest { observation })
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(unreachable(format!("API error ({}): {}", status, body)));
        }

        let body: ActionResponse = response
            .json()
            .await
            .map_err(|e| unreachable(format!("malformed response: {}", e)))?;

        if body.action < 1 || body.action > u32::MAX as i64 {
            return Err(unreachable(format!("invalid action {}", body.action)));
        }

        debug!(service = %service, action = body.action, "Policy decided");
        Ok(body.action as u32)
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(self.base_url.clone())
            .send()
            .await
            .map_err(|e| ScalerError::policy_unreachable("*", e.to_string()))?;

        if !response.status().is_success() {
            return Err(ScalerError::policy_unreachable(
                "*",
                format!("health check returned {}", response.status()),
            ));
        }
        Ok(())
    }
}
