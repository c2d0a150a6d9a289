use crate::config::ServerConfig;
use crate::connection::handle_connection;
use crate::error::RelayError;
use crate::forward::Forwarder;
use crate::gate::SessionGate;
use crate::metrics::HealthState;
use crate::shutdown::ShutdownCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// How long to wait for in-flight connections when shutting down.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state for the relay server.
pub struct ServerState {
    /// Runtime server configuration.
    pub config: ServerConfig,
    /// Single-client admission gate.
    pub gate: Arc<SessionGate>,
    /// Upstream forwarder shared by all connections.
    pub forwarder: Forwarder,
    /// Shutdown coordinator triggered by signals or `listenerClose`.
    pub shutdown: Arc<ShutdownCoordinator>,
}

/// Run the accept loop until the state's shutdown coordinator fires.
///
/// # Errors
///
/// Returns an error if the listener's local address cannot be read.
pub async fn run(listener: TcpListener, state: Arc<ServerState>) -> Result<(), RelayError> {
    let shutdown_rx = state.shutdown.subscribe();
    run_with_shutdown(listener, state, shutdown_rx, HealthState::new()).await
}

/// Run the accept loop with an externally supplied shutdown receiver.
///
/// When the shutdown signal fires, the loop stops accepting, marks the
/// service not-ready, and drains in-flight connections with a bounded
/// timeout before returning.
///
/// # Errors
///
/// Returns an error if the listener's local address cannot be read.
pub async fn run_with_shutdown(
    listener: TcpListener,
    state: Arc<ServerState>,
    mut shutdown_rx: watch::Receiver<()>,
    health: HealthState,
) -> Result<(), RelayError> {
    let local_addr = listener.local_addr().map_err(RelayError::Io)?;
    info!(
        "buffer relay listening on {}{}",
        local_addr, state.config.path
    );
    health.set_ready(true);

    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!("received connection from {}", addr);
                        // reap connection tasks that have already finished
                        while connections.try_join_next().is_some() {}
                        let state = Arc::clone(&state);
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, state).await {
                                debug!("connection from {} closed: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("failed to accept connection: {}", e);
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                info!("shutdown requested, draining {} connections", connections.len());
                break;
            }
        }
    }

    health.set_ready(false);
    drop(listener);

    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(
            "drain timeout reached with {} connections still active",
            connections.len()
        );
        connections.shutdown().await;
    }

    info!("relay shut down");
    Ok(())
}
