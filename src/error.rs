use thiserror::Error;

/// Errors that can occur while serving a relay connection.
///
/// Forward failures are deliberately absent: they are reported to the client
/// as `remoteError` events and never propagate as server errors.
#[derive(Error, Debug)]
pub enum RelayError {
    /// A client attempted to initialize while another session was active.
    #[error("admission rejected: a client is already connected")]
    AdmissionRejected,
    /// WebSocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// An outbound event could not be encoded.
    #[error("event encoding error: {0}")]
    Encode(#[from] serde_json::Error),
    /// The upstream HTTP client could not be constructed.
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
    /// The configured remote method is not a valid HTTP method.
    #[error("invalid remote method: {0}")]
    InvalidMethod(String),
}
