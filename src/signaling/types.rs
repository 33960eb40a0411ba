use std::fmt;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Utf8Bytes;

/// Signaling server errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalingError {
    #[error("room is full: {0}")]
    RoomFull(RoomId),

    #[error("already in room {0}, leave it first")]
    AlreadyInRoom(RoomId),

    #[error("not in a room")]
    NotInRoom,

    #[error("unknown room: {0}")]
    UnknownRoom(RoomId),

    #[error("peer {0} is not in your room")]
    PeerNotInRoom(ClientId),

    #[error("unknown client: {0}")]
    UnknownClient(ClientId),

    #[error("invalid client id: {0}")]
    InvalidClientId(String),

    #[error("invalid room id: {0}")]
    InvalidRoomId(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("failed to deliver to {0}")]
    TransportFailure(ClientId),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SignalingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RoomFull(_) => ErrorKind::RoomFull,
            Self::AlreadyInRoom(_) => ErrorKind::AlreadyInRoom,
            Self::NotInRoom => ErrorKind::NotInRoom,
            Self::UnknownRoom(_) => ErrorKind::UnknownRoom,
            Self::PeerNotInRoom(_) => ErrorKind::PeerNotInRoom,
            Self::UnknownClient(_) => ErrorKind::UnknownClient,
            Self::InvalidClientId(_) | Self::InvalidRoomId(_) | Self::InvalidMessage(_) => {
                ErrorKind::InvalidMessage
            }
            Self::TransportFailure(_) => ErrorKind::TransportFailure,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Error discriminant carried by `error` messages on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RoomFull,
    AlreadyInRoom,
    NotInRoom,
    UnknownRoom,
    PeerNotInRoom,
    UnknownClient,
    InvalidMessage,
    TransportFailure,
    Internal,
}

const ROOM_ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const GENERATED_ROOM_ID_LEN: usize = 8;
pub const MAX_ROOM_ID_LEN: usize = 64;

const CLIENT_ID_PREFIX: &[u8] = b"client_";
const CLIENT_ID_LEN: usize = 15;
const HEX_CHARS: &[u8] = b"0123456789abcdef";

/// Room identifier chosen by clients (or generated when omitted).
///
/// Ids are 1 to 64 characters of `[A-Za-z0-9_-]`. Unlike client ids they are
/// never truncated: two distinct strings always name two distinct rooms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId(Arc<str>);

impl RoomId {
    pub fn parse(s: &str) -> Result<Self, SignalingError> {
        let valid_len = !s.is_empty() && s.len() <= MAX_ROOM_ID_LEN;
        let valid_chars = s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if valid_len && valid_chars {
            Ok(Self(Arc::from(s)))
        } else {
            Err(SignalingError::InvalidRoomId(s.to_string()))
        }
    }

    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let id: String = (0..GENERATED_ROOM_ID_LEN)
            .map(|_| ROOM_ID_CHARS[rng.random_range(0..ROOM_ID_CHARS.len())] as char)
            .collect();
        Self(Arc::from(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RoomId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RoomId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        RoomId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Client ID: 15-byte fixed array ("client_" + 8 hex)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId {
    bytes: [u8; CLIENT_ID_LEN],
    len: u8,
}

impl ClientId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; CLIENT_ID_LEN];
        let prefix = CLIENT_ID_PREFIX.len();
        bytes[..prefix].copy_from_slice(CLIENT_ID_PREFIX);

        let mut rng = rand::rng();
        let value: u32 = rng.random();

        for i in 0..8 {
            let nibble = ((value >> (28 - i * 4)) & 0xF) as usize;
            bytes[prefix + i] = HEX_CHARS[nibble];
        }
        Self {
            bytes,
            len: CLIENT_ID_LEN as u8,
        }
    }

    /// Accept exactly `client_` followed by 8 lowercase hex digits
    pub fn parse(s: &str) -> Result<Self, SignalingError> {
        let src = s.as_bytes();
        let valid = src.len() == CLIENT_ID_LEN
            && src.starts_with(CLIENT_ID_PREFIX)
            && src[CLIENT_ID_PREFIX.len()..]
                .iter()
                .all(|b| HEX_CHARS.contains(b));
        if !valid {
            return Err(SignalingError::InvalidClientId(s.to_string()));
        }

        let mut bytes = [0u8; CLIENT_ID_LEN];
        bytes.copy_from_slice(src);
        Ok(Self {
            bytes,
            len: CLIENT_ID_LEN as u8,
        })
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ClientId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ClientId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ClientId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Where a client is in its lifecycle. Absence from the registry is the
/// disconnected state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// Connected, never joined a room
    Registered,
    /// Member of exactly one room
    InRoom(RoomId),
    /// Left a room and may join another
    WaitingForRoom,
}

impl ClientState {
    pub fn room(&self) -> Option<&RoomId> {
        match self {
            ClientState::InRoom(room) => Some(room),
            _ => None,
        }
    }
}

/// Wrapper for outbound WebSocket messages using tungstenite's Utf8Bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage(Utf8Bytes);

impl OutboundMessage {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Get the inner Utf8Bytes for tungstenite Message::Text
    pub fn into_inner(self) -> Utf8Bytes {
        self.0
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self(Utf8Bytes::from(s))
    }
}

/// Transport handle: the outbound queue drained by a client's writer task.
/// Uses OutboundMessage (cheaply cloned bytes) for O(1) broadcast cloning.
pub type ClientTx = mpsc::UnboundedSender<OutboundMessage>;
