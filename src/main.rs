#![forbid(unsafe_code)]

use anyhow::Result;
use bufrelay::config::{Args, ServerConfig};
use bufrelay::forward::Forwarder;
use bufrelay::gate::SessionGate;
use bufrelay::metrics::{start_metrics_server, HealthState};
use bufrelay::server::ServerState;
use bufrelay::shutdown::{self, ShutdownCoordinator};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config: ServerConfig = args.into();
    if let Err(e) = config.validate() {
        anyhow::bail!("configuration error: {}", e);
    }

    let (coordinator, shutdown_rx) = ShutdownCoordinator::new();
    shutdown::spawn_signal_listeners(Arc::clone(&coordinator));

    let forwarder = Forwarder::new(&config.remote)?;
    info!(
        "forwarding buffers via {} to {}",
        config.remote.method,
        config.remote.url()
    );

    let state = Arc::new(ServerState {
        gate: SessionGate::new(config.limit),
        forwarder,
        shutdown: coordinator,
        config: config.clone(),
    });

    let listener = TcpListener::bind(config.listen).await?;

    let health_state = HealthState::new();
    tokio::spawn({
        let health_state = health_state.clone();
        let metrics_addr = config.metrics_addr;
        async move {
            if let Err(e) = start_metrics_server(metrics_addr, health_state).await {
                warn!("metrics server error: {}", e);
            }
        }
    });

    // Returning Ok after a graceful drain is the zero exit status the
    // shutdown contract promises.
    bufrelay::run_with_shutdown(listener, state, shutdown_rx, health_state).await?;
    Ok(())
}
