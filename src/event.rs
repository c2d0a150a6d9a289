use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events sent by the client.
///
/// Wire form is one JSON object per WebSocket text message, tagged by event
/// name: `{"event": "clientInit"}` or `{"event": "bufferPush", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Request admission to the relay.
    ClientInit,
    /// End the session.
    ClientGoodbye,
    /// A buffer to forward upstream. The payload is opaque to the relay.
    BufferPush(Value),
    /// Request a full relay shutdown.
    ListenerClose,
}

/// Events sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Admission granted.
    ServerHello,
    /// Session end acknowledged.
    ServerGoodbye,
    /// The buffer was accepted upstream.
    #[serde(rename = "remoteSuccess")]
    RemoteSuccess,
    /// The forward failed; carries the transport error description.
    #[serde(rename = "remoteError")]
    RemoteError(String),
}
