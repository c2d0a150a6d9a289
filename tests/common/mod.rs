use bufrelay::config::{RemoteConfig, ServerConfig};
use bufrelay::event::{ClientEvent, ServerEvent};
use bufrelay::forward::Forwarder;
use bufrelay::gate::SessionGate;
use bufrelay::metrics::HealthState;
use bufrelay::server::ServerState;
use bufrelay::shutdown::ShutdownCoordinator;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub const WS_PATH: &str = "/buffers";

pub fn test_config(listen: SocketAddr, remote_port: u16, limit: usize) -> ServerConfig {
    ServerConfig {
        listen,
        path: WS_PATH.to_string(),
        metrics_addr: "127.0.0.1:0".parse().unwrap(),
        remote: RemoteConfig {
            method: "POST".to_string(),
            host: "127.0.0.1".to_string(),
            port: remote_port,
            path: "/ingest".to_string(),
        },
        limit,
        log_buffer: false,
    }
}

pub struct RelayHandle {
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
    pub server: JoinHandle<()>,
}

pub async fn start_relay(remote_port: u16, limit: usize) -> RelayHandle {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = test_config(addr, remote_port, limit);

    let (coordinator, shutdown_rx) = ShutdownCoordinator::new();
    let state = Arc::new(ServerState {
        gate: SessionGate::new(config.limit),
        forwarder: Forwarder::new(&config.remote).unwrap(),
        shutdown: coordinator,
        config,
    });

    let server = tokio::spawn({
        let state = Arc::clone(&state);
        async move {
            if let Err(e) =
                bufrelay::run_with_shutdown(listener, state, shutdown_rx, HealthState::new()).await
            {
                eprintln!("server error in test: {e}");
            }
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    RelayHandle {
        addr,
        state,
        server,
    }
}

/// Minimal upstream that records every JSON body POSTed to `/ingest`.
pub async fn start_upstream() -> (u16, mpsc::UnboundedReceiver<Value>) {
    use axum::routing::post;

    let (tx, rx) = mpsc::unbounded_channel::<Value>();
    let app = axum::Router::new().route(
        "/ingest",
        post(move |axum::Json(body): axum::Json<Value>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(body);
                axum::http::StatusCode::OK
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("upstream error in test: {e}");
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    (port, rx)
}

/// Reserve a loopback port with nothing listening on it.
pub async fn unreachable_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

pub struct TestClient {
    pub ws_tx: futures_util::stream::SplitSink<
        WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
        Message,
    >,
    pub ws_rx:
        futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>,
}

impl TestClient {
    pub async fn connect(addr: &SocketAddr) -> Self {
        let url = format!("ws://{addr}{WS_PATH}");
        let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        let (ws_tx, ws_rx) = ws.split();
        Self { ws_tx, ws_rx }
    }

    /// Connect and complete the `clientInit` / `ServerHello` handshake.
    pub async fn init(addr: &SocketAddr) -> Self {
        let mut client = Self::connect(addr).await;
        client.send(&ClientEvent::ClientInit).await;
        let hello = client.recv().await;
        assert!(
            matches!(hello, ServerEvent::ServerHello),
            "expected ServerHello, got {hello:?}"
        );
        client
    }

    pub async fn send(&mut self, event: &ClientEvent) {
        let text = serde_json::to_string(event).unwrap();
        self.ws_tx.send(Message::Text(text)).await.unwrap();
    }

    /// Next server event; panics on close, error, or timeout.
    pub async fn recv(&mut self) -> ServerEvent {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), self.ws_rx.next())
                .await
                .expect("timeout waiting for event")
                .expect("stream ended")
                .expect("websocket error");
            match msg {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                Message::Ping(_) | Message::Pong(_) => {}
                other => panic!("expected text event, got {other:?}"),
            }
        }
    }

    /// True when the server ends the connection without sending another
    /// event within `wait`.
    pub async fn closed_without_event(&mut self, wait: Duration) -> bool {
        let result = tokio::time::timeout(wait, async {
            while let Some(msg) = self.ws_rx.next().await {
                match msg {
                    Ok(Message::Text(text)) => return Some(text),
                    Ok(Message::Close(_)) | Err(_) => return None,
                    _ => {}
                }
            }
            None
        })
        .await;
        matches!(result, Ok(None))
    }
}
