//! WebSocket signaling relay: pairs clients into rooms and forwards
//! offer/answer/candidate messages between them

mod actor;
mod messages;
mod registry;
mod relay;
mod room;
mod server;
mod supervisor;
mod types;

pub use actor::{Coordinator, CoordinatorHandle, CoordinatorStats};
pub use messages::{ClientMessage, ServerMessage, SignalKind, SignalMessage};
pub use registry::ConnectionRegistry;
pub use relay::{RelayReport, relay};
pub use room::{DEFAULT_ROOM_CAPACITY, JoinOutcome, LeaveOutcome, Room, RoomManager};
pub use server::{DEFAULT_SIGNALING_PORT, SignalingServer};
pub use supervisor::disconnect;
pub use types::{
    ClientId, ClientState, ClientTx, ErrorKind, MAX_ROOM_ID_LEN, OutboundMessage, RoomId,
    SignalingError,
};
