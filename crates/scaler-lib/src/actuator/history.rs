//! Per-service scaling history
//!
//! One JSON document per service, `{app_name, history: [...]}`, rewritten in
//! full on every persist. Writes go to a sibling temp file which is then
//! renamed over the target, so a crash never leaves a truncated document.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One record per successful tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    /// Seconds since the owning loop started
    pub elapsed_seconds: f64,
    pub instances: u32,
    pub cpu_usage: f64,
    pub requests_per_second: f64,
    pub mean_request_time: f64,
    pub total_arrived_requests: usize,
    /// Normalized workload fed to the policy
    pub workload: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHistory {
    pub app_name: String,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl ServiceHistory {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            history: Vec::new(),
        }
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.history.last()
    }
}

/// Durable storage for service histories
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Load the history of `app_name`; a missing document is an empty history
    async fn load(&self, app_name: &str) -> Result<ServiceHistory>;

    async fn save(&self, history: &ServiceHistory) -> Result<()>;
}

/// Stores each history as `<dir>/<app_name>_history.json`
#[derive(Debug, Clone)]
pub struct JsonFileHistoryStore {
    dir: PathBuf,
}

impl JsonFileHistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, app_name: &str) -> PathBuf {
        history_path(&self.dir, app_name)
    }
}

/// Location of the history document for `app_name` under `dir`
pub fn history_path(dir: &Path, app_name: &str) -> PathBuf {
    dir.join(format!("{}_history.json", app_name))
}

#[async_trait]
impl HistoryStore for JsonFileHistoryStore {
    async fn load(&self, app_name: &str) -> Result<ServiceHistory> {
        let path = self.path_for(app_name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No history yet");
                Ok(ServiceHistory::new(app_name))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, history: &ServiceHistory) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(&history.app_name);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(history)?;

        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(
            path = %path.display(),
            entries = history.history.len(),
            "Persisted history"
        );
        Ok(())
    }
}
