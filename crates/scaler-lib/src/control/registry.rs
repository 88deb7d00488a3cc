//! Service ownership and status snapshots
//!
//! Every service loop claims its service here before starting. A second
//! claim for the same service is rejected, which keeps a single writer per
//! replica count within one process.

use super::LoopPhase;
use crate::actuator::HistoryEntry;
use crate::error::{Result, ScalerError};
use crate::models::ScalingDecision;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Point-in-time view of one service loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub service: String,
    /// Control-plane app name
    pub app: String,
    pub phase: LoopPhase,
    pub ticks: u64,
    pub current_replicas: Option<u32>,
    pub last_outcome: Option<String>,
    pub last_decision: Option<ScalingDecision>,
    pub last_entry: Option<HistoryEntry>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceSnapshot {
    fn claimed(service: &str, app: &str) -> Self {
        Self {
            service: service.to_string(),
            app: app.to_string(),
            phase: LoopPhase::Idle,
            ticks: 0,
            current_replicas: None,
            last_outcome: None,
            last_decision: None,
            last_entry: None,
            updated_at: Utc::now(),
        }
    }
}

/// Registry of services owned by this process
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: DashMap<String, ServiceSnapshot>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `service`
    pub fn claim(&self, service: &str, app: &str) -> Result<()> {
        match self.services.entry(service.to_string()) {
            Entry::Occupied(_) => Err(ScalerError::ConfigInvalid(format!(
                "service '{}' already has an owning control loop",
                service
            ))),
            Entry::Vacant(slot) => {
                debug!(service = %service, app = %app, "Claimed service");
                slot.insert(ServiceSnapshot::claimed(service, app));
                Ok(())
            }
        }
    }

    /// Replace the snapshot of an already claimed service
    pub fn publish(&self, snapshot: ServiceSnapshot) {
        if let Some(mut entry) = self.services.get_mut(&snapshot.service) {
            *entry = snapshot;
        }
    }

    pub fn get(&self, service: &str) -> Option<ServiceSnapshot> {
        self.services.get(service).map(|r| r.clone())
    }

    /// All snapshots, ordered by service name
    pub fn list(&self) -> Vec<ServiceSnapshot> {
        let mut all: Vec<ServiceSnapshot> =
            self.services.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.service.cmp(&b.service));
        all
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
