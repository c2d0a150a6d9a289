use crate::error::RelayError;
use crate::event::{ClientEvent, ServerEvent};
use crate::forward::ForwardOutcome;
use crate::gate::SessionGuard;
use crate::metrics::counters;
use crate::server::ServerState;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Outstanding forwards per connection before backpressure kicks in.
const OUTCOME_CHANNEL_CAPACITY: usize = 32;

async fn send_event(ws_tx: &mut WsSink, event: &ServerEvent) -> Result<(), RelayError> {
    let text = serde_json::to_string(event)?;
    ws_tx
        .send(Message::Text(text))
        .await
        .map_err(RelayError::WebSocket)
}

/// Serve one client connection: upgrade the WebSocket (gated on the
/// configured path), then drive the event loop until the client leaves,
/// the session is rejected, or the transport fails.
pub async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<ServerState>,
) -> Result<(), RelayError> {
    let expected_path = state.config.path.clone();
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, move |req: &Request, resp: Response| {
        if req.uri().path() == expected_path {
            Ok(resp)
        } else {
            debug!("rejecting handshake for path {}", req.uri().path());
            let mut not_found = ErrorResponse::new(None);
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            Err(not_found)
        }
    })
    .await
    .map_err(RelayError::WebSocket)?;

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (outcome_tx, mut outcome_rx) = mpsc::channel::<ForwardOutcome>(OUTCOME_CHANNEL_CAPACITY);
    let mut session: Option<SessionGuard> = None;

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let event = match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => event,
                            Err(e) => {
                                warn!("ignoring malformed event from {}: {}", peer_addr, e);
                                continue;
                            }
                        };
                        match event {
                            ClientEvent::ClientInit => {
                                debug!("received init request from client");
                                match state.gate.admit() {
                                    Some(guard) => {
                                        counters::admissions_total("admitted");
                                        info!("accepting client, sending ServerHello");
                                        session = Some(guard);
                                        send_event(&mut ws_tx, &ServerEvent::ServerHello).await?;
                                    }
                                    None => {
                                        counters::admissions_total("rejected");
                                        warn!(
                                            "dropping connection from {}: a client is already connected",
                                            peer_addr
                                        );
                                        return Err(RelayError::AdmissionRejected);
                                    }
                                }
                            }
                            ClientEvent::ClientGoodbye => {
                                info!("client disconnected, sending goodbye");
                                session.take();
                                send_event(&mut ws_tx, &ServerEvent::ServerGoodbye).await?;
                                let _ = ws_tx.send(Message::Close(None)).await;
                                return Ok(());
                            }
                            ClientEvent::BufferPush(buffer) => {
                                counters::buffers_received_total();
                                if state.config.log_buffer {
                                    info!(buffer = %buffer, "buffer received");
                                } else {
                                    debug!("buffer received");
                                }
                                state.forwarder.spawn(buffer, outcome_tx.clone());
                            }
                            ClientEvent::ListenerClose => {
                                info!("received close request from client");
                                state.shutdown.goodbye();
                                return Ok(());
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                            debug!("failed to send pong: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Err(e)) => return Err(RelayError::WebSocket(e)),
                    _ => {}
                }
            }
            Some(outcome) = outcome_rx.recv() => {
                match outcome {
                    Ok(()) => send_event(&mut ws_tx, &ServerEvent::RemoteSuccess).await?,
                    Err(e) => {
                        send_event(&mut ws_tx, &ServerEvent::RemoteError(e.to_string())).await?;
                    }
                }
            }
        }
    }
}
