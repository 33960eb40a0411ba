use std::collections::HashMap;
use std::net::SocketAddr;

use tracing::{debug, info};

use super::types::{ClientId, ClientState, ClientTx, OutboundMessage, SignalingError};

/// A connected client, owned by the registry
#[derive(Debug)]
pub(crate) struct Client {
    pub addr: Option<SocketAddr>,
    pub state: ClientState,
    /// Cleared after a failed send; dead clients are skipped until torn down.
    pub alive: bool,
    tx: ClientTx,
}

impl Client {
    pub fn send(&self, id: ClientId, msg: OutboundMessage) -> Result<(), SignalingError> {
        self.tx
            .send(msg)
            .map_err(|_| SignalingError::TransportFailure(id))
    }
}

/// Tracks connected clients and their transport handles
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    clients: HashMap<ClientId, Client>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport handle. Does not place the client in any room.
    pub fn register(&mut self, tx: ClientTx, addr: Option<SocketAddr>) -> ClientId {
        let mut id = ClientId::generate();
        while self.clients.contains_key(&id) {
            id = ClientId::generate();
        }

        self.clients.insert(
            id,
            Client {
                addr,
                state: ClientState::Registered,
                alive: true,
                tx,
            },
        );
        info!("Client {} registered ({:?})", id, addr);
        id
    }

    /// Remove a client. Unknown ids are ignored so duplicate disconnects are harmless.
    pub fn unregister(&mut self, id: &ClientId) -> bool {
        match self.clients.remove(id) {
            Some(_) => {
                info!("Client {} unregistered", id);
                true
            }
            None => {
                debug!("Unregister for unknown client {}", id);
                false
            }
        }
    }

    pub fn lookup(&self, id: &ClientId) -> Result<&ClientTx, SignalingError> {
        self.clients
            .get(id)
            .map(|c| &c.tx)
            .ok_or(SignalingError::UnknownClient(*id))
    }

    pub fn state(&self, id: &ClientId) -> Option<&ClientState> {
        self.clients.get(id).map(|c| &c.state)
    }

    pub fn is_alive(&self, id: &ClientId) -> bool {
        self.clients.get(id).is_some_and(|c| c.alive)
    }

    pub fn mark_dead(&mut self, id: &ClientId) {
        if let Some(client) = self.clients.get_mut(id) {
            client.alive = false;
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub(crate) fn get(&self, id: &ClientId) -> Option<&Client> {
        self.clients.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &ClientId) -> Option<&mut Client> {
        self.clients.get_mut(id)
    }
}
