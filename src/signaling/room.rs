use std::collections::HashMap;

use tracing::{debug, info};

use super::messages::ServerMessage;
use super::registry::ConnectionRegistry;
use super::relay::broadcast;
use super::types::{ClientId, ClientState, RoomId, SignalingError};

pub const DEFAULT_ROOM_CAPACITY: usize = 2;

/// Members in join order; the first one is the session initiator.
#[derive(Debug)]
pub struct Room {
    members: Vec<ClientId>,
    capacity: usize,
}

impl Room {
    fn new(capacity: usize) -> Self {
        Self {
            members: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn members(&self) -> &[ClientId] {
        &self.members
    }

    pub fn contains(&self, id: &ClientId) -> bool {
        self.members.contains(id)
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.capacity
    }

    pub fn initiator(&self) -> Option<&ClientId> {
        self.members.first()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub room_id: RoomId,
    /// Members present before the join, in join order
    pub peers: Vec<ClientId>,
    pub initiator: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveOutcome {
    pub room_id: RoomId,
    pub remaining: Vec<ClientId>,
    pub room_destroyed: bool,
}

/// Groups clients into capacity-limited rooms
#[derive(Debug)]
pub struct RoomManager {
    rooms: HashMap<RoomId, Room>,
    capacity: usize,
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new(DEFAULT_ROOM_CAPACITY)
    }
}

impl RoomManager {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// A fresh room id that no live room uses
    pub fn unused_room_id(&self) -> RoomId {
        let mut id = RoomId::generate();
        while self.rooms.contains_key(&id) {
            id = RoomId::generate();
        }
        id
    }

    /// Admit `client` into `room_id`, creating the room if needed.
    ///
    /// The joiner is sent `joined` before the existing members are sent
    /// `peer_joined`, so nothing relayed afterwards can overtake it. On error
    /// nothing is changed.
    pub fn join(
        &mut self,
        registry: &mut ConnectionRegistry,
        client_id: &ClientId,
        room_id: RoomId,
    ) -> Result<JoinOutcome, SignalingError> {
        let client = registry
            .get(client_id)
            .ok_or(SignalingError::UnknownClient(*client_id))?;
        if let Some(current) = client.state.room() {
            return Err(SignalingError::AlreadyInRoom(current.clone()));
        }
        if self.rooms.get(&room_id).is_some_and(Room::is_full) {
            return Err(SignalingError::RoomFull(room_id));
        }

        let capacity = self.capacity;
        let room = self.rooms.entry(room_id.clone()).or_insert_with(|| {
            info!("Room {} created", room_id);
            Room::new(capacity)
        });
        let peers = room.members.clone();
        room.members.push(*client_id);

        if let Some(client) = registry.get_mut(client_id) {
            client.state = ClientState::InRoom(room_id.clone());
        }

        let outcome = JoinOutcome {
            room_id: room_id.clone(),
            initiator: peers.is_empty(),
            peers,
        };

        let joined = ServerMessage::Joined {
            room_id: room_id.clone(),
            client_id: *client_id,
            peers: outcome.peers.clone(),
            initiator: outcome.initiator,
        };
        broadcast(registry, [client_id], &joined.encode());

        let peer_joined = ServerMessage::PeerJoined {
            client_id: *client_id,
        };
        broadcast(registry, &outcome.peers, &peer_joined.encode());

        info!(
            "Client {} joined room {} ({} members)",
            client_id,
            room_id,
            outcome.peers.len() + 1
        );
        Ok(outcome)
    }

    /// Remove `client_id` from its room and tell the remaining members.
    /// Returns `None` when the client was not in a room.
    pub fn leave(
        &mut self,
        registry: &mut ConnectionRegistry,
        client_id: &ClientId,
    ) -> Option<LeaveOutcome> {
        let client = registry.get_mut(client_id)?;
        let room_id = match &client.state {
            ClientState::InRoom(room_id) => room_id.clone(),
            _ => {
                debug!("Leave from {} ignored: not in a room", client_id);
                return None;
            }
        };
        client.state = ClientState::WaitingForRoom;

        let Some(room) = self.rooms.get_mut(&room_id) else {
            debug!("{}", SignalingError::UnknownRoom(room_id));
            return None;
        };
        room.members.retain(|id| id != client_id);
        let remaining = room.members.clone();

        let peer_left = ServerMessage::PeerLeft {
            client_id: *client_id,
        };
        broadcast(registry, &remaining, &peer_left.encode());

        let room_destroyed = remaining.is_empty();
        if room_destroyed {
            self.rooms.remove(&room_id);
            info!("Room {} removed (empty)", room_id);
        }

        info!("Client {} left room {}", client_id, room_id);
        Some(LeaveOutcome {
            room_id,
            remaining,
            room_destroyed,
        })
    }

    pub fn get(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::types::OutboundMessage;
    use tokio::sync::mpsc;

    type Rx = mpsc::UnboundedReceiver<OutboundMessage>;

    fn connect(registry: &mut ConnectionRegistry) -> (ClientId, Rx) {
        let (tx, rx) = mpsc::unbounded_channel();
        (registry.register(tx, None), rx)
    }

    fn drain(rx: &mut Rx) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(serde_json::from_str(msg.as_str()).unwrap());
        }
        out
    }

    fn r1() -> RoomId {
        RoomId::parse("r1").unwrap()
    }

    #[test]
    fn first_joiner_creates_room_and_is_initiator() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::default();
        let (a, mut rx_a) = connect(&mut registry);

        let outcome = rooms.join(&mut registry, &a, r1()).unwrap();
        assert!(outcome.initiator);
        assert!(outcome.peers.is_empty());
        assert_eq!(rooms.len(), 1);
        assert_eq!(registry.state(&a), Some(&ClientState::InRoom(r1())));
        assert_eq!(
            drain(&mut rx_a),
            vec![ServerMessage::Joined {
                room_id: r1(),
                client_id: a,
                peers: vec![],
                initiator: true,
            }]
        );
    }

    #[test]
    fn second_joiner_notifies_existing_member() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::default();
        let (a, mut rx_a) = connect(&mut registry);
        let (b, mut rx_b) = connect(&mut registry);
        rooms.join(&mut registry, &a, r1()).unwrap();
        drain(&mut rx_a);

        let outcome = rooms.join(&mut registry, &b, r1()).unwrap();
        assert!(!outcome.initiator);
        assert_eq!(outcome.peers, vec![a]);
        assert_eq!(drain(&mut rx_a), vec![ServerMessage::PeerJoined { client_id: b }]);
        assert!(matches!(
            drain(&mut rx_b).as_slice(),
            [ServerMessage::Joined { initiator: false, .. }]
        ));
        assert_eq!(rooms.get(&r1()).unwrap().initiator(), Some(&a));
    }

    #[test]
    fn full_room_rejects_and_keeps_membership() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::new(2);
        let (a, _rx_a) = connect(&mut registry);
        let (b, _rx_b) = connect(&mut registry);
        let (c, mut rx_c) = connect(&mut registry);
        rooms.join(&mut registry, &a, r1()).unwrap();
        rooms.join(&mut registry, &b, r1()).unwrap();

        let err = rooms.join(&mut registry, &c, r1()).unwrap_err();
        assert_eq!(err, SignalingError::RoomFull(r1()));
        assert_eq!(rooms.get(&r1()).unwrap().members(), &[a, b]);
        assert_eq!(registry.state(&c), Some(&ClientState::Registered));
        assert!(drain(&mut rx_c).is_empty());
    }

    #[test]
    fn joining_second_room_requires_leave() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::default();
        let (a, _rx_a) = connect(&mut registry);
        let other = RoomId::parse("r2").unwrap();
        rooms.join(&mut registry, &a, r1()).unwrap();

        let err = rooms.join(&mut registry, &a, other.clone()).unwrap_err();
        assert_eq!(err, SignalingError::AlreadyInRoom(r1()));
        assert!(rooms.get(&other).is_none());

        // rejoining the same room is rejected too
        assert!(rooms.join(&mut registry, &a, r1()).is_err());

        rooms.leave(&mut registry, &a).unwrap();
        assert_eq!(registry.state(&a), Some(&ClientState::WaitingForRoom));
        rooms.join(&mut registry, &a, other.clone()).unwrap();
        assert_eq!(registry.state(&a), Some(&ClientState::InRoom(other)));
    }

    #[test]
    fn leave_notifies_remaining_and_destroys_empty_room() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::default();
        let (a, mut rx_a) = connect(&mut registry);
        let (b, mut rx_b) = connect(&mut registry);
        rooms.join(&mut registry, &a, r1()).unwrap();
        rooms.join(&mut registry, &b, r1()).unwrap();
        drain(&mut rx_a);
        drain(&mut rx_b);

        let outcome = rooms.leave(&mut registry, &a).unwrap();
        assert_eq!(outcome.remaining, vec![b]);
        assert!(!outcome.room_destroyed);
        assert_eq!(drain(&mut rx_b), vec![ServerMessage::PeerLeft { client_id: a }]);
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(rooms.get(&r1()).unwrap().initiator(), Some(&b));

        let outcome = rooms.leave(&mut registry, &b).unwrap();
        assert!(outcome.room_destroyed);
        assert!(rooms.is_empty());
    }

    #[test]
    fn leave_outside_room_is_noop() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::default();
        let (a, _rx_a) = connect(&mut registry);

        assert!(rooms.leave(&mut registry, &a).is_none());
        assert!(rooms.leave(&mut registry, &ClientId::parse("client_0000beef").unwrap()).is_none());
        assert_eq!(registry.state(&a), Some(&ClientState::Registered));
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::new(3);
        let mut receivers = Vec::new();
        let mut admitted = 0;

        for _ in 0..10 {
            let (id, rx) = connect(&mut registry);
            receivers.push(rx);
            if rooms.join(&mut registry, &id, r1()).is_ok() {
                admitted += 1;
            }
            assert!(rooms.get(&r1()).unwrap().members().len() <= 3);
        }
        assert_eq!(admitted, 3);
    }

    #[test]
    fn unused_room_id_avoids_live_rooms() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::default();
        let (a, _rx) = connect(&mut registry);
        let id = rooms.unused_room_id();
        rooms.join(&mut registry, &a, id.clone()).unwrap();
        assert_ne!(rooms.unused_room_id(), id);
    }
}
