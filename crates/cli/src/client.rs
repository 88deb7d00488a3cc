//! HTTP client for the scaling gateway and the agent API

use anyhow::{Context, Result};
use reqwest::Client;
use scaler_lib::actuator::AppStatus;
use scaler_lib::control::ServiceSnapshot;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use url::Url;

pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        // Relative joins keep any path prefix only with a trailing slash
        let mut base_url = Url::parse(base_url).context("Invalid API URL")?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Replica status of every app known to the gateway, ordered by app
    pub async fn scale_status(&self) -> Result<BTreeMap<String, AppStatus>> {
        self.get("scale-status").await
    }

    /// Control loop snapshots served by the agent
    pub async fn loop_status(&self) -> Result<Vec<ServiceSnapshot>> {
        self.get("status").await
    }
}
