use tracing::{debug, info};

use super::registry::ConnectionRegistry;
use super::room::{LeaveOutcome, RoomManager};
use super::types::ClientId;

/// Tear down a disconnected client: leave its room (remaining members get one
/// `peer_left` each) and drop it from the registry.
///
/// Returns `false` for a client that was already removed.
pub fn disconnect(
    registry: &mut ConnectionRegistry,
    rooms: &mut RoomManager,
    client_id: &ClientId,
) -> bool {
    if registry.lookup(client_id).is_err() {
        debug!("Disconnect for unknown client {}", client_id);
        return false;
    }

    let left: Option<LeaveOutcome> = rooms.leave(registry, client_id);
    registry.unregister(client_id);

    match left {
        Some(outcome) => info!(
            "Client {} disconnected from room {} ({} remaining)",
            client_id,
            outcome.room_id,
            outcome.remaining.len()
        ),
        None => info!("Client {} disconnected", client_id),
    }
    true
}
