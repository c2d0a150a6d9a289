use axum::{http::StatusCode, response::Json, routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Readiness check response.
#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    listening: bool,
}

/// Tracks whether the relay is currently accepting client connections.
///
/// Flipped by the accept loop as it moves between its listening and
/// shutting-down phases, so `/ready` reflects the actual server lifecycle.
#[derive(Clone, Default)]
pub struct HealthState {
    listening: Arc<AtomicBool>,
}

impl HealthState {
    /// Create a health state; the relay starts out not listening.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark the relay as listening (or not).
    pub fn set_ready(&self, ready: bool) {
        self.listening.store(ready, Ordering::Relaxed);
    }

    /// Whether the relay is accepting connections.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.listening.load(Ordering::Relaxed)
    }
}

/// Serve `/metrics`, `/health` and `/ready` on the given address.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed or binding the
/// metrics HTTP server fails.
pub async fn start_metrics_server(addr: SocketAddr, health_state: HealthState) -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let app = Router::new()
        .route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
        .route("/health", get(health_handler))
        .route("/ready", get(move || ready_handler(health_state.clone())));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("metrics server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Liveness handler - 200 whenever the process is up.
async fn health_handler() -> (StatusCode, Json<HealthResponse>) {
    (StatusCode::OK, Json(HealthResponse { status: "healthy" }))
}

/// Readiness handler - 200 while the accept loop is running, 503 otherwise.
async fn ready_handler(state: HealthState) -> (StatusCode, Json<ReadyResponse>) {
    if state.is_ready() {
        (
            StatusCode::OK,
            Json(ReadyResponse {
                status: "listening",
                listening: true,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                status: "not listening",
                listening: false,
            }),
        )
    }
}

/// Session gauges.
pub mod gauges {
    /// Increment the active sessions gauge.
    pub fn inc_sessions_active() {
        metrics::gauge!("bufrelay_sessions_active").increment(1.0);
    }

    /// Decrement the active sessions gauge.
    pub fn dec_sessions_active() {
        metrics::gauge!("bufrelay_sessions_active").decrement(1.0);
    }
}

/// Event counters.
pub mod counters {
    /// Record an admission attempt with the given status label.
    pub fn admissions_total(status: &'static str) {
        metrics::counter!("bufrelay_admissions_total", "status" => status).increment(1);
    }

    /// Increment the received-buffers counter.
    pub fn buffers_received_total() {
        metrics::counter!("bufrelay_buffers_received_total").increment(1);
    }

    /// Record a completed forward with the given outcome label.
    pub fn forwards_total(outcome: &'static str) {
        metrics::counter!("bufrelay_forwards_total", "outcome" => outcome).increment(1);
    }
}

/// Latency histograms.
pub mod histograms {
    /// Record one forward's upstream round-trip time in seconds.
    pub fn forward_latency_seconds(value: f64) {
        metrics::histogram!("bufrelay_forward_latency_seconds").record(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_state_starts_not_ready() {
        let state = HealthState::new();
        assert!(!state.is_ready());
    }

    #[test]
    fn health_state_toggles() {
        let state = HealthState::new();
        state.set_ready(true);
        assert!(state.is_ready());
        state.set_ready(false);
        assert!(!state.is_ready());
    }

    #[test]
    fn health_state_clones_share_the_flag() {
        let state = HealthState::new();
        let clone = state.clone();
        state.set_ready(true);
        assert!(clone.is_ready());
    }
}
