use tracing::{debug, warn};

use super::messages::{ServerMessage, SignalMessage};
use super::registry::ConnectionRegistry;
use super::room::RoomManager;
use super::types::{ClientId, OutboundMessage, SignalingError};

/// Outcome of a broadcast: who got the message and whose transport failed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayReport {
    pub delivered: Vec<ClientId>,
    pub failed: Vec<ClientId>,
}

/// Send one message to each recipient. A failed send is logged and marks the
/// recipient dead; the remaining recipients are still attempted.
pub(crate) fn broadcast<'a>(
    registry: &mut ConnectionRegistry,
    recipients: impl IntoIterator<Item = &'a ClientId>,
    msg: &OutboundMessage,
) -> RelayReport {
    let mut report = RelayReport::default();

    for id in recipients {
        let Some(client) = registry.get(id) else {
            continue;
        };
        if !client.alive {
            debug!("Skipping dead client {}", id);
            continue;
        }

        match client.send(*id, msg.clone()) {
            Ok(()) => report.delivered.push(*id),
            Err(e) => {
                warn!("{}", e);
                registry.mark_dead(id);
                report.failed.push(*id);
            }
        }
    }

    report
}

/// Deliver a signal from `sender` to the other members of its room, or to a
/// single member when the signal names a target.
pub fn relay(
    registry: &mut ConnectionRegistry,
    rooms: &RoomManager,
    sender: &ClientId,
    signal: SignalMessage,
) -> Result<RelayReport, SignalingError> {
    let state = registry
        .state(sender)
        .ok_or(SignalingError::UnknownClient(*sender))?;
    let room_id = state.room().ok_or(SignalingError::NotInRoom)?;
    let room = rooms
        .get(room_id)
        .ok_or_else(|| SignalingError::Internal(format!("room {} missing", room_id)))?;

    if let Some(target) = signal.to {
        if target == *sender || !room.contains(&target) {
            return Err(SignalingError::PeerNotInRoom(target));
        }
    }

    debug!("Relaying {:?} from {} in room {}", signal.kind, sender, room_id);

    let msg = ServerMessage::signal(*sender, signal.kind, signal.payload).encode();
    let recipients = room
        .members()
        .iter()
        .filter(|id| *id != sender)
        .filter(|id| signal.to.is_none_or(|target| **id == target));

    Ok(broadcast(registry, recipients, &msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::messages::SignalKind;
    use crate::signaling::types::RoomId;
    use serde_json::json;
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

    fn offer(payload: serde_json::Value) -> SignalMessage {
        SignalMessage {
            kind: SignalKind::Offer,
            payload,
            to: None,
        }
    }

    #[test]
    fn relay_requires_room() {
        let mut registry = ConnectionRegistry::new();
        let rooms = RoomManager::new(2);
        let (a, _rx) = connect(&mut registry);

        let err = relay(&mut registry, &rooms, &a, offer(json!("sdp"))).unwrap_err();
        assert_eq!(err, SignalingError::NotInRoom);
    }

    #[test]
    fn relay_skips_sender_and_preserves_order() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::new(3);
        let room = RoomId::parse("r1").unwrap();
        let (a, mut rx_a) = connect(&mut registry);
        let (b, mut rx_b) = connect(&mut registry);
        let (c, mut rx_c) = connect(&mut registry);
        for id in [a, b, c] {
            rooms.join(&mut registry, &id, room.clone()).unwrap();
        }
        drain(&mut rx_a);
        drain(&mut rx_b);
        drain(&mut rx_c);

        relay(&mut registry, &rooms, &a, offer(json!(1))).unwrap();
        let candidate = SignalMessage {
            kind: SignalKind::Candidate,
            payload: json!(2),
            to: None,
        };
        let report = relay(&mut registry, &rooms, &a, candidate).unwrap();
        assert_eq!(report.delivered, vec![b, c]);

        assert!(drain(&mut rx_a).is_empty());
        for rx in [&mut rx_b, &mut rx_c] {
            assert_eq!(
                drain(rx),
                vec![
                    ServerMessage::Offer { from: a, payload: json!(1) },
                    ServerMessage::Candidate { from: a, payload: json!(2) },
                ]
            );
        }
    }

    #[test]
    fn directed_signal_reaches_only_target() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::new(3);
        let room = RoomId::parse("mesh").unwrap();
        let (a, _rx_a) = connect(&mut registry);
        let (b, mut rx_b) = connect(&mut registry);
        let (c, mut rx_c) = connect(&mut registry);
        for id in [a, b, c] {
            rooms.join(&mut registry, &id, room.clone()).unwrap();
        }
        drain(&mut rx_b);
        drain(&mut rx_c);

        let mut signal = offer(json!("to-c"));
        signal.to = Some(c);
        let report = relay(&mut registry, &rooms, &a, signal).unwrap();

        assert_eq!(report.delivered, vec![c]);
        assert!(drain(&mut rx_b).is_empty());
        assert_eq!(drain(&mut rx_c).len(), 1);
    }

    #[test]
    fn directed_signal_outside_room_fails() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::new(2);
        let (a, _rx_a) = connect(&mut registry);
        let (outsider, _rx_o) = connect(&mut registry);
        rooms.join(&mut registry, &a, RoomId::parse("r1").unwrap()).unwrap();

        let mut signal = offer(json!(null));
        signal.to = Some(outsider);
        let err = relay(&mut registry, &rooms, &a, signal).unwrap_err();
        assert_eq!(err, SignalingError::PeerNotInRoom(outsider));
    }

    #[test]
    fn failed_recipient_does_not_block_others() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::new(3);
        let room = RoomId::parse("r1").unwrap();
        let (a, _rx_a) = connect(&mut registry);
        let (b, rx_b) = connect(&mut registry);
        let (c, mut rx_c) = connect(&mut registry);
        for id in [a, b, c] {
            rooms.join(&mut registry, &id, room.clone()).unwrap();
        }
        drain(&mut rx_c);
        drop(rx_b);

        let report = relay(&mut registry, &rooms, &a, offer(json!("x"))).unwrap();
        assert_eq!(report.failed, vec![b]);
        assert_eq!(report.delivered, vec![c]);
        assert!(!registry.is_alive(&b));
        assert_eq!(drain(&mut rx_c).len(), 1);

        // dead recipients are no longer attempted
        let report = relay(&mut registry, &rooms, &a, offer(json!("y"))).unwrap();
        assert!(report.failed.is_empty());
        assert_eq!(report.delivered, vec![c]);
    }
}
