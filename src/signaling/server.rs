use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tracing::{debug, error, info, warn};

use super::actor::CoordinatorHandle;
use super::messages::{ClientMessage, ServerMessage, SignalKind, SignalMessage};
use super::types::{ClientId, ClientTx, OutboundMessage, RoomId, SignalingError};
use crate::config::{Config, ServerSettings};

pub const DEFAULT_SIGNALING_PORT: u16 = 3479;

pub struct SignalingServer {
    listener: TcpListener,
    handle: CoordinatorHandle,
    settings: Arc<ServerSettings>,
}

impl SignalingServer {
    /// Bind the listener and start the coordinator actor
    pub async fn bind(addr: &str, config: &Config) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let handle = CoordinatorHandle::spawn(config.rooms.capacity, config.server.command_buffer);

        info!(
            "Signaling server listening on {} (room capacity {})",
            listener.local_addr()?,
            config.rooms.capacity
        );

        Ok(Self {
            listener,
            handle,
            settings: Arc::new(config.server.clone()),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> CoordinatorHandle {
        self.handle.clone()
    }

    pub async fn run(self) -> std::io::Result<()> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let handle = self.handle.clone();
            let settings = self.settings.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, handle, settings).await {
                    error!("Connection error from {}: {}", addr, e);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    handle: CoordinatorHandle,
    settings: Arc<ServerSettings>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let limit = settings.transport_limit();
    let ws_config = WebSocketConfig::default()
        .max_message_size(Some(limit))
        .max_frame_size(Some(limit));
    let ws_stream = tokio_tungstenite::accept_async_with_config(stream, Some(ws_config)).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    info!("WebSocket connection from {}", addr);

    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<Message>();

    let client_id = handle.register(tx.clone(), Some(addr)).await?;
    let _ = tx.send(ServerMessage::Welcome { client_id }.encode());

    let mut ping_interval = tokio::time::interval(settings.ping_interval());
    let mut waiting_for_pong = false;
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(msg) = rx.recv() => {
                    let ws_msg = Message::Text(msg.into_inner());
                    if ws_tx.send(ws_msg).await.is_err() {
                        break;
                    }
                }
                Some(ctrl_msg) = ctrl_rx.recv() => {
                    if ws_tx.send(ctrl_msg).await.is_err() {
                        break;
                    }
                }
                else => break,
            }
        }
    });

    loop {
        let pong_timeout = async {
            match pong_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = ping_interval.tick() => {
                if waiting_for_pong {
                    warn!("No Pong received, disconnecting {}", client_id);
                    break;
                }
                if ctrl_tx.send(Message::Ping(Bytes::new())).is_err() {
                    break;
                }
                waiting_for_pong = true;
                pong_deadline = Some(tokio::time::Instant::now() + settings.pong_timeout());
                debug!("Ping sent to {}", client_id);
            }

            _ = pong_timeout => {
                warn!("Pong timeout, disconnecting {}", client_id);
                break;
            }

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        warn!("WebSocket error from {}: {}", client_id, e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => {
                        let limit = settings.max_message_bytes;
                        handle_text_message(&text, &tx, &handle, client_id, limit).await;
                    }
                    Message::Pong(_) => {
                        waiting_for_pong = false;
                        pong_deadline = None;
                        debug!("Pong received from {}", client_id);
                    }
                    Message::Close(_) => {
                        info!("Close received from {}", client_id);
                        break;
                    }
                    // binary and raw frames carry nothing in this protocol
                    _ => {}
                }
            }
        }
    }

    handle.disconnect(client_id).await;

    send_task.abort();
    info!("WebSocket disconnected: {} ({})", client_id, addr);

    Ok(())
}

/// Decode one text frame and dispatch it. Failures go back to the sender as
/// `error` messages; the connection stays open.
async fn handle_text_message(
    text: &str,
    tx: &ClientTx,
    handle: &CoordinatorHandle,
    client_id: ClientId,
    max_bytes: usize,
) {
    let result = if text.len() > max_bytes {
        Err(SignalingError::InvalidMessage(format!(
            "message of {} bytes exceeds limit of {}",
            text.len(),
            max_bytes
        )))
    } else {
        match ClientMessage::decode(text) {
            Ok(msg) => dispatch(msg, tx, handle, client_id).await,
            Err(e) => Err(e),
        }
    };

    if let Err(e) = result {
        warn!("Request from {} failed: {}", client_id, e);
        let _ = tx.send(ServerMessage::error(&e).encode());
    }
}

async fn dispatch(
    msg: ClientMessage,
    tx: &ClientTx,
    handle: &CoordinatorHandle,
    client_id: ClientId,
) -> Result<(), SignalingError> {
    match msg {
        ClientMessage::Join { room_id } => on_join(handle, client_id, room_id).await,
        ClientMessage::Leave => on_leave(tx, handle, client_id).await,
        ClientMessage::Offer { payload, to } => {
            on_signal(handle, client_id, SignalKind::Offer, payload, to).await
        }
        ClientMessage::Answer { payload, to } => {
            on_signal(handle, client_id, SignalKind::Answer, payload, to).await
        }
        ClientMessage::Candidate { payload, to } => {
            on_signal(handle, client_id, SignalKind::Candidate, payload, to).await
        }
    }
}

async fn on_join(
    handle: &CoordinatorHandle,
    client_id: ClientId,
    room_id: Option<RoomId>,
) -> Result<(), SignalingError> {
    // the coordinator sends `joined` itself so it is queued ahead of any relayed signal
    let outcome = handle.join(client_id, room_id).await?;
    debug!(
        "{} joined {} as {}",
        client_id,
        outcome.room_id,
        if outcome.initiator { "initiator" } else { "responder" }
    );
    Ok(())
}

async fn on_leave(
    tx: &ClientTx,
    handle: &CoordinatorHandle,
    client_id: ClientId,
) -> Result<(), SignalingError> {
    if let Some(room_id) = handle.leave(client_id).await? {
        let _ = tx.send(ServerMessage::Left { room_id }.encode());
    }
    Ok(())
}

async fn on_signal(
    handle: &CoordinatorHandle,
    client_id: ClientId,
    kind: SignalKind,
    payload: Value,
    to: Option<ClientId>,
) -> Result<(), SignalingError> {
    let report = handle
        .relay(client_id, SignalMessage { kind, payload, to })
        .await?;
    if !report.failed.is_empty() {
        debug!(
            "{:?} from {} not delivered to {:?}",
            kind, client_id, report.failed
        );
    }
    Ok(())
}
