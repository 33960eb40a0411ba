use std::net::SocketAddr;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::SignalMessage;
use super::registry::ConnectionRegistry;
use super::relay::{self, RelayReport};
use super::room::{JoinOutcome, RoomManager};
use super::supervisor;
use super::types::{ClientId, ClientTx, RoomId, SignalingError};

/// Registry plus rooms: the whole coordination state, mutated by one owner.
#[derive(Debug, Default)]
pub struct Coordinator {
    registry: ConnectionRegistry,
    rooms: RoomManager,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub clients: usize,
    pub rooms: usize,
}

impl Coordinator {
    pub fn new(room_capacity: usize) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            rooms: RoomManager::new(room_capacity),
        }
    }

    pub fn register(&mut self, tx: ClientTx, addr: Option<SocketAddr>) -> ClientId {
        self.registry.register(tx, addr)
    }

    pub fn join(
        &mut self,
        client: &ClientId,
        room_id: Option<RoomId>,
    ) -> Result<JoinOutcome, SignalingError> {
        let room_id = room_id.unwrap_or_else(|| self.rooms.unused_room_id());
        self.rooms.join(&mut self.registry, client, room_id)
    }

    pub fn leave(&mut self, client: &ClientId) -> Option<RoomId> {
        self.rooms
            .leave(&mut self.registry, client)
            .map(|outcome| outcome.room_id)
    }

    pub fn relay(
        &mut self,
        client: &ClientId,
        signal: SignalMessage,
    ) -> Result<RelayReport, SignalingError> {
        relay::relay(&mut self.registry, &self.rooms, client, signal)
    }

    pub fn disconnect(&mut self, client: &ClientId) -> bool {
        supervisor::disconnect(&mut self.registry, &mut self.rooms, client)
    }

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            clients: self.registry.len(),
            rooms: self.rooms.len(),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomManager {
        &self.rooms
    }
}

/// Commands sent to the coordinator actor
#[derive(Debug)]
pub(crate) enum Command {
    Register {
        addr: Option<SocketAddr>,
        tx: ClientTx,
        reply: oneshot::Sender<ClientId>,
    },
    Join {
        client: ClientId,
        room_id: Option<RoomId>,
        reply: oneshot::Sender<Result<JoinOutcome, SignalingError>>,
    },
    Leave {
        client: ClientId,
        reply: oneshot::Sender<Option<RoomId>>,
    },
    Relay {
        client: ClientId,
        signal: SignalMessage,
        reply: oneshot::Sender<Result<RelayReport, SignalingError>>,
    },
    Disconnect {
        client: ClientId,
    },
    Stats {
        reply: oneshot::Sender<CoordinatorStats>,
    },
}

pub(crate) async fn coordinator_actor(
    mut coordinator: Coordinator,
    mut rx: mpsc::Receiver<Command>,
) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Register { addr, tx, reply } => {
                let id = coordinator.register(tx, addr);
                let _ = reply.send(id);
            }

            Command::Join {
                client,
                room_id,
                reply,
            } => {
                // requester went away before the join was applied
                if reply.is_closed() {
                    debug!("Dropping abandoned join from {}", client);
                    continue;
                }
                let _ = reply.send(coordinator.join(&client, room_id));
            }

            Command::Leave { client, reply } => {
                let _ = reply.send(coordinator.leave(&client));
            }

            Command::Relay {
                client,
                signal,
                reply,
            } => {
                let _ = reply.send(coordinator.relay(&client, signal));
            }

            Command::Disconnect { client } => {
                coordinator.disconnect(&client);
            }

            Command::Stats { reply } => {
                let _ = reply.send(coordinator.stats());
            }
        }
    }
    debug!("Coordinator actor stopped");
}

/// Handle to communicate with the coordinator actor.
///
/// One actor owns every room, so commands from all connections are applied
/// one at a time. Each command only touches in-memory maps and queues frames
/// on unbounded per-client channels; it never awaits a socket. The actual
/// WebSocket writes happen in each connection's writer task, in parallel, so
/// a slow client delays only its own frames.
#[derive(Clone)]
pub struct CoordinatorHandle {
    pub(crate) tx: mpsc::Sender<Command>,
}

fn closed() -> SignalingError {
    SignalingError::Internal("actor channel closed".to_string())
}

impl CoordinatorHandle {
    /// Spawn a coordinator actor on the current runtime
    pub fn spawn(room_capacity: usize, buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Command>(buffer.max(1));
        tokio::spawn(coordinator_actor(Coordinator::new(room_capacity), rx));
        Self { tx }
    }

    /// Register a new connection and get its id
    pub async fn register(
        &self,
        tx: ClientTx,
        addr: Option<SocketAddr>,
    ) -> Result<ClientId, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(Command::Register {
                addr,
                tx,
                reply: reply_tx,
            })
            .await;
        reply_rx.await.map_err(|_| closed())
    }

    /// Join a room, or a fresh room when `room_id` is `None`
    pub async fn join(
        &self,
        client: ClientId,
        room_id: Option<RoomId>,
    ) -> Result<JoinOutcome, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(Command::Join {
                client,
                room_id,
                reply: reply_tx,
            })
            .await;
        reply_rx.await.map_err(|_| closed())?
    }

    /// Leave the current room; `None` when not in one
    pub async fn leave(&self, client: ClientId) -> Result<Option<RoomId>, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(Command::Leave {
                client,
                reply: reply_tx,
            })
            .await;
        reply_rx.await.map_err(|_| closed())
    }

    pub async fn relay(
        &self,
        client: ClientId,
        signal: SignalMessage,
    ) -> Result<RelayReport, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(Command::Relay {
                client,
                signal,
                reply: reply_tx,
            })
            .await;
        reply_rx.await.map_err(|_| closed())?
    }

    /// Transport-level disconnect notification. Safe to repeat.
    pub async fn disconnect(&self, client: ClientId) {
        let _ = self.tx.send(Command::Disconnect { client }).await;
    }

    pub async fn stats(&self) -> Result<CoordinatorStats, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self.tx.send(Command::Stats { reply: reply_tx }).await;
        reply_rx.await.map_err(|_| closed())
    }
}
