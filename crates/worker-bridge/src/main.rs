//! Taskbridge binary.
//!
//! Hosts the connection supervisor and the workflow pool manager: starts them
//! in dependency order, watches their startup error channels, and stops them
//! in reverse order on shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::time::timeout;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use worker_bridge::runner::ProcessPoolRunner;
use worker_bridge::{
    BridgeConfig, ConnectionSupervisor, EventBroadcaster, RpcFacade, Service,
    WorkflowPoolManager,
};

/// Start a service and wait out its readiness window.
///
/// The error channel carries at most one failure; silence for the duration
/// of the window means the service is up.
async fn start(service: &dyn Service, window: Duration) -> Result<()> {
    let mut rx = service.serve().await;

    match timeout(window, rx.recv()).await {
        Ok(Some(e)) => Err(anyhow!("{} failed to start: {}", service.name(), e)),
        Ok(None) | Err(_) => {
            tracing::info!(service = service.name(), "Service started");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,worker_bridge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    tracing::info!("Starting Taskbridge");

    // Load configuration
    let config = BridgeConfig::from_env()?;
    tracing::info!(
        address = %config.address,
        namespace = %config.namespace,
        task_queue = %config.pool.task_queue,
        workers = config.pool.workers,
        "Bridge configuration loaded"
    );
    let readiness = config.readiness_window;

    // Wire components; the pool manager depends on the supervisor.
    let events = Arc::new(EventBroadcaster::new());
    let supervisor = Arc::new(ConnectionSupervisor::new(config, events.clone()));
    let manager = WorkflowPoolManager::new(
        supervisor.clone(),
        Arc::new(ProcessPoolRunner::new()),
        events,
    );

    start(supervisor.as_ref(), readiness).await?;

    // Control-plane callers reach the engine client through the facade.
    let rpc = RpcFacade::for_supervisor(supervisor.clone()).await?;
    if let Err(e) = rpc.get_client().await?.health_check().await {
        tracing::warn!(error = %e, "Engine health probe failed; continuing");
    }

    start(&manager, readiness).await?;

    // Handle shutdown signals
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    if let Err(e) = manager.stop().await {
        tracing::error!(error = %e, "Workflow pool stop failed");
    }
    if let Err(e) = supervisor.stop().await {
        tracing::error!(error = %e, "Connection stop failed");
    }

    tracing::info!("Taskbridge stopped");
    Ok(())
}
