use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{ClientId, ErrorKind, OutboundMessage, RoomId, SignalingError};

/// Negotiation message discriminant. The payload it travels with is never inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
}

/// An offer, answer or candidate on its way through the relay
#[derive(Debug, Clone, PartialEq)]
pub struct SignalMessage {
    pub kind: SignalKind,
    pub payload: Value,
    /// `None` targets every other member of the sender's room
    pub to: Option<ClientId>,
}

/// Messages sent from client to server
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join (or create) a room; the server picks an id when none is given
    Join {
        #[serde(default)]
        room_id: Option<RoomId>,
    },

    /// Leave the current room
    Leave,

    Offer {
        payload: Value,
        #[serde(default)]
        to: Option<ClientId>,
    },

    Answer {
        payload: Value,
        #[serde(default)]
        to: Option<ClientId>,
    },

    Candidate {
        payload: Value,
        #[serde(default)]
        to: Option<ClientId>,
    },
}

impl ClientMessage {
    pub fn decode(text: &str) -> Result<Self, SignalingError> {
        serde_json::from_str(text).map_err(|e| SignalingError::InvalidMessage(e.to_string()))
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First message on every connection
    Welcome { client_id: ClientId },

    /// Joined a room. `initiator` is true for the earliest member, which sends the offer.
    Joined {
        room_id: RoomId,
        client_id: ClientId,
        peers: Vec<ClientId>,
        initiator: bool,
    },

    /// Left the room after an explicit leave request
    Left { room_id: RoomId },

    /// A new member joined your room
    PeerJoined { client_id: ClientId },

    /// A member left your room or disconnected
    PeerLeft { client_id: ClientId },

    Offer { from: ClientId, payload: Value },

    Answer { from: ClientId, payload: Value },

    Candidate { from: ClientId, payload: Value },

    /// Error response
    Error { kind: ErrorKind, message: String },
}

impl ServerMessage {
    pub fn signal(from: ClientId, kind: SignalKind, payload: Value) -> Self {
        match kind {
            SignalKind::Offer => ServerMessage::Offer { from, payload },
            SignalKind::Answer => ServerMessage::Answer { from, payload },
            SignalKind::Candidate => ServerMessage::Candidate { from, payload },
        }
    }

    pub fn error(err: &SignalingError) -> Self {
        ServerMessage::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn encode(&self) -> OutboundMessage {
        let json =
            serde_json::to_string(self).expect("ServerMessage serialization should never fail");
        OutboundMessage::from(json)
    }
}
