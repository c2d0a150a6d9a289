use clap::Parser;
use std::net::SocketAddr;

/// HTTP methods accepted for the upstream forward.
const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE"];

/// CLI arguments for the buffer relay.
#[derive(Parser, Debug, Clone)]
#[command(name = "bufrelay")]
#[command(about = "Single-client JSON buffer relay")]
#[command(version)]
pub struct Args {
    /// Socket address to listen on for client connections.
    #[arg(long, default_value = "0.0.0.0:8700", env = "BUFRELAY_LISTEN")]
    pub listen: SocketAddr,
    /// URL path clients must use for the WebSocket handshake.
    #[arg(long, default_value = "/buffers", env = "BUFRELAY_PATH")]
    pub path: String,
    /// Socket address for the metrics endpoint.
    #[arg(long, default_value = "127.0.0.1:9100", env = "BUFRELAY_METRICS")]
    pub metrics_addr: SocketAddr,
    /// HTTP method used for the upstream forward.
    #[arg(long, default_value = "POST", env = "BUFRELAY_REMOTE_METHOD")]
    pub remote_method: String,
    /// Upstream host.
    #[arg(long, default_value = "127.0.0.1", env = "BUFRELAY_REMOTE_HOST")]
    pub remote_host: String,
    /// Upstream port.
    #[arg(long, default_value = "8080", env = "BUFRELAY_REMOTE_PORT")]
    pub remote_port: u16,
    /// Upstream request path.
    #[arg(long, default_value = "/", env = "BUFRELAY_REMOTE_PATH")]
    pub remote_path: String,
    /// Session limit. 0 disables the limit; any positive value caps
    /// admissions at one active client.
    #[arg(long, default_value = "1", env = "BUFRELAY_LIMIT")]
    pub limit: usize,
    /// Log each received buffer at info level.
    #[arg(long, env = "BUFRELAY_LOG_BUFFER")]
    pub log_buffer: bool,
}

/// Upstream endpoint descriptor, immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// HTTP method for the forward request.
    pub method: String,
    /// Upstream host.
    pub host: String,
    /// Upstream port.
    pub port: u16,
    /// Upstream request path.
    pub path: String,
}

impl RemoteConfig {
    /// Full URL of the upstream endpoint.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.path)
    }
}

/// Runtime configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub listen: SocketAddr,
    /// WebSocket handshake path.
    pub path: String,
    /// Socket address for the metrics endpoint.
    pub metrics_addr: SocketAddr,
    /// Upstream endpoint descriptor.
    pub remote: RemoteConfig,
    /// Session limit (0 = unlimited, >0 = one client at a time).
    pub limit: usize,
    /// Verbose buffer logging.
    pub log_buffer: bool,
}

impl ServerConfig {
    /// Validates the configuration values.
    /// Returns Ok(()) if valid, Err with description otherwise.
    pub fn validate(&self) -> Result<(), String> {
        if !self.path.starts_with('/') {
            return Err("path must start with '/'".to_string());
        }

        if self.remote.host.is_empty() {
            return Err("remote host must not be empty".to_string());
        }
        if self.remote.port == 0 {
            return Err("remote port must be greater than 0".to_string());
        }
        if !self.remote.path.starts_with('/') {
            return Err("remote path must start with '/'".to_string());
        }

        let method = self.remote.method.to_ascii_uppercase();
        if !ALLOWED_METHODS.contains(&method.as_str()) {
            return Err(format!(
                "remote method must be one of {ALLOWED_METHODS:?}, got {}",
                self.remote.method
            ));
        }

        Ok(())
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: args.listen,
            path: args.path,
            metrics_addr: args.metrics_addr,
            remote: RemoteConfig {
                method: args.remote_method,
                host: args.remote_host,
                port: args.remote_port,
                path: args.remote_path,
            },
            limit: args.limit,
            log_buffer: args.log_buffer,
        }
    }
}
