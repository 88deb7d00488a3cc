//! Live status from the scaling gateway and the agent

use anyhow::Result;
use scaler_lib::control::ServiceSnapshot;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_availability, color_status, print_header, print_json, print_table, OutputFormat,
};

#[derive(Tabled)]
struct ScaleStatusRow {
    #[tabled(rename = "App")]
    app: String,
    #[tabled(rename = "Deployment")]
    deployment: String,
    #[tabled(rename = "Available")]
    replicas: String,
}

#[derive(Tabled)]
struct LoopRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "App")]
    app: String,
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Ticks")]
    ticks: u64,
    #[tabled(rename = "Replicas")]
    replicas: String,
    #[tabled(rename = "Last Outcome")]
    outcome: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl From<&ServiceSnapshot> for LoopRow {
    fn from(snapshot: &ServiceSnapshot) -> Self {
        Self {
            service: snapshot.service.clone(),
            app: snapshot.app.clone(),
            phase: color_status(snapshot.phase.as_str()),
            ticks: snapshot.ticks,
            replicas: snapshot
                .current_replicas
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string()),
            outcome: snapshot
                .last_outcome
                .as_deref()
                .map(color_status)
                .unwrap_or_else(|| "-".to_string()),
            updated: snapshot.updated_at.format("%H:%M:%S").to_string(),
        }
    }
}

/// Show replica counts as reported by the gateway's `/scale-status`
pub async fn show_scale_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let apps = client.scale_status().await?;

    match format {
        OutputFormat::Json => print_json(&apps)?,
        OutputFormat::Table => {
            print_header("Scale Status");
            let rows: Vec<ScaleStatusRow> = apps
                .iter()
                .map(|(app, status)| ScaleStatusRow {
                    app: app.clone(),
                    deployment: status.deployment.clone().unwrap_or_else(|| "-".to_string()),
                    replicas: color_availability(status.available, status.instances),
                })
                .collect();
            print_table(rows);
        }
    }

    Ok(())
}

/// Show the agent's per-service loop snapshots
pub async fn show_loops(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let snapshots = client.loop_status().await?;

    match format {
        OutputFormat::Json => print_json(&snapshots)?,
        OutputFormat::Table => {
            print_header("Control Loops");
            print_table(snapshots.iter().map(LoopRow::from).collect());
        }
    }

    Ok(())
}
