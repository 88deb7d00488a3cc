//! Log Agent - log-derived autoscaling daemon
//!
//! Runs one control loop per configured service: reconstructs request
//! latencies from the log store, asks the policy for a replica count and
//! applies it through the scaling gateway.

use anyhow::Result;
use scaler_lib::{
    control::{ControlLoopBuilder, ServiceRegistry},
    health::HealthRegistry,
    observability::StructuredLogger,
    policy::{HttpPolicyClient, PolicyClient},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting log-agent");

    let config = config::AgentConfig::load()?;
    info!(
        instance = %config.instance_name,
        services = config.scaler.services.len(),
        tick_interval_secs = config.scaler.tick_interval_secs,
        window_secs = config.scaler.window_secs,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let logger = StructuredLogger::new(&config.instance_name);
    let services = Arc::new(ServiceRegistry::new());

    // Reachability only; the loops hold on their own when the policy is down
    let policy = HttpPolicyClient::new(
        &config.scaler.endpoints.policy,
        config.scaler.request_timeout(),
    )?;
    if let Err(e) = policy.health_check().await {
        warn!(error = %e, "Policy endpoint not reachable at startup");
    }

    let scheduler = ControlLoopBuilder::new(config.scaler.clone())
        .http_adapters()?
        .registry(services.clone())
        .health(health_registry.clone())
        .logger(logger.clone())
        .build()
        .await?;

    logger.log_startup(AGENT_VERSION, &scheduler.services());

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), services));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let (shutdown_tx, _) = broadcast::channel(1);
    let loop_handles = scheduler.spawn(&shutdown_tx);

    health_registry.set_ready(true).await;

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    // Loops finish their in-flight tick before returning
    let _ = shutdown_tx.send(());
    for handle in loop_handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Control loop task failed");
        }
    }

    api_handle.abort();
    info!("Shutdown complete");

    Ok(())
}
