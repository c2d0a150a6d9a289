//! Single-client JSON buffer relay.
//!
//! Accepts one WebSocket client at a time, validates a `clientInit`
//! handshake, and forwards each pushed JSON buffer to a fixed upstream HTTP
//! endpoint, reporting the outcome back on the same connection.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// CLI argument parsing and server configuration.
pub mod config;
mod connection;
/// Error types for relay operations.
pub mod error;
/// Wire protocol: JSON events exchanged with the client.
pub mod event;
/// Outbound forwarding of buffers to the upstream endpoint.
pub mod forward;
/// Single-client admission gate.
pub mod gate;
/// Prometheus metrics collection and health endpoints.
pub mod metrics;
/// Accept loop and shared server state.
pub mod server;
/// Graceful-shutdown coordination and signal handling.
pub mod shutdown;

pub use server::{run, run_with_shutdown, ServerState};
