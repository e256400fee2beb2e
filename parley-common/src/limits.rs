//! Per-type payload limits for relay messages

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::validators::MAX_PEER_ID_LENGTH;

/// Largest serialized negotiation payload (session description or candidate)
pub const MAX_SIGNAL_PAYLOAD_LENGTH: usize = 64 * 1024;

/// Longest error text the relay sends before closing a connection
pub const MAX_ERROR_LENGTH: usize = 512;

/// JSON around a signal payload: type tag, target id, kind, and sender id
/// {"type":"ReceiveSignal","signal":{"kind":"ice-candidate","payload":,"fromPeerId":"...64..."}}
const SIGNAL_OVERHEAD: usize = 128 + 2 * MAX_PEER_ID_LENGTH;

/// Apply 20% padding to a limit for safety margin
const fn pad_limit(base: u64) -> u64 {
    // Use integer math: multiply by 6 and divide by 5 equals 1.2x
    (base * 6) / 5
}

/// Largest `RelaySignal` a client may send
const RELAY_SIGNAL_LIMIT: u64 = pad_limit((MAX_SIGNAL_PAYLOAD_LENGTH + SIGNAL_OVERHEAD) as u64);

/// Room for the relay stamping the sender onto a forwarded signal
///
/// A `null` sender becomes a quoted identity and the type tag grows by two
/// characters; the dropped target id only ever shrinks the frame.
const STAMPED_SENDER_GROWTH: u64 = 2 * MAX_PEER_ID_LENGTH as u64;

/// Largest `ReceiveSignal` the relay forwards
///
/// Any `RelaySignal` within its own limit still fits here once stamped.
const RECEIVE_SIGNAL_LIMIT: u64 = RELAY_SIGNAL_LIMIT + STAMPED_SENDER_GROWTH;

/// Upper bound for any single relay frame, checked before the type is known
pub const MAX_FRAME_LENGTH: usize = RECEIVE_SIGNAL_LIMIT as usize;

/// Maximum payload sizes for each message type
///
/// Base limits match the maximum serialized JSON size given the validator
/// constraints, then 20% padding is added. Tests verify the base values fit.
static MESSAGE_TYPE_LIMITS: LazyLock<HashMap<&'static str, u64>> = LazyLock::new(|| {
    let mut m = HashMap::new();
    let id = MAX_PEER_ID_LENGTH as u64;

    // Client messages
    m.insert("Register", pad_limit(36 + id));
    m.insert("RelaySignal", RELAY_SIGNAL_LIMIT);

    // Server messages
    m.insert("Registered", pad_limit(34 + id));
    m.insert("ReceiveSignal", RECEIVE_SIGNAL_LIMIT);
    m.insert("PeerConnected", pad_limit(37 + id));
    m.insert("PeerDisconnected", pad_limit(40 + id));
    m.insert("Error", pad_limit(29 + MAX_ERROR_LENGTH as u64));

    m
});

/// Get the maximum payload size for a message type
///
/// Returns `None` for unknown message types.
#[must_use]
pub fn max_payload_for_type(message_type: &str) -> Option<u64> {
    MESSAGE_TYPE_LIMITS.get(message_type).copied()
}

/// Check if a message type is known
#[must_use]
pub fn is_known_message_type(message_type: &str) -> bool {
    MESSAGE_TYPE_LIMITS.contains_key(message_type)
}

/// Get all known message type names
#[must_use]
pub fn known_message_types() -> Vec<&'static str> {
    MESSAGE_TYPE_LIMITS.keys().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ClientMessage, PeerId, ServerMessage, SignalEnvelope};

    /// Helper to get serialized JSON size of a message
    fn json_size<T: serde::Serialize>(msg: &T) -> usize {
        serde_json::to_vec(msg).unwrap().len()
    }

    fn max_id() -> PeerId {
        PeerId::new("x".repeat(MAX_PEER_ID_LENGTH))
    }

    /// A signal whose serialized payload is exactly the maximum
    fn max_signal() -> SignalEnvelope {
        let payload = serde_json::Value::String("s".repeat(MAX_SIGNAL_PAYLOAD_LENGTH - 2));
        let mut signal = SignalEnvelope::ice_candidate(payload);
        signal.from_peer_id = Some(max_id());
        signal
    }

    fn limit(message_type: &str) -> usize {
        max_payload_for_type(message_type).unwrap() as usize
    }

    #[test]
    fn test_unknown_type_has_no_limit() {
        assert_eq!(max_payload_for_type("UnknownType"), None);
        assert!(!is_known_message_type("UnknownType"));
    }

    #[test]
    fn test_all_protocol_types_have_limits() {
        const CLIENT_MESSAGE_COUNT: usize = 2;
        const SERVER_MESSAGE_COUNT: usize = 5;
        assert_eq!(
            known_message_types().len(),
            CLIENT_MESSAGE_COUNT + SERVER_MESSAGE_COUNT
        );
    }

    #[test]
    fn test_limit_register() {
        let msg = ClientMessage::Register {
            existing_id: Some(max_id()),
        };
        assert!(json_size(&msg) <= limit(msg.type_name()));
        assert_eq!(json_size(&msg), 36 + MAX_PEER_ID_LENGTH);
    }

    #[test]
    fn test_limit_relay_signal() {
        let msg = ClientMessage::RelaySignal {
            target_id: max_id(),
            signal: max_signal(),
        };
        assert!(json_size(&msg) <= limit(msg.type_name()));
    }

    #[test]
    fn test_limit_receive_signal() {
        let msg = ServerMessage::ReceiveSignal {
            signal: max_signal(),
        };
        assert!(json_size(&msg) <= limit(msg.type_name()));
    }

    /// A `RelaySignal` padded to exactly its limit with an unset sender
    fn relay_signal_at_limit(target: &str) -> SignalEnvelope {
        let mut signal = SignalEnvelope::ice_candidate(serde_json::Value::String(String::new()));
        let empty = ClientMessage::RelaySignal {
            target_id: PeerId::from(target),
            signal: signal.clone(),
        };
        let fill = limit("RelaySignal") - json_size(&empty);
        signal.payload = serde_json::Value::String("s".repeat(fill));
        let msg = ClientMessage::RelaySignal {
            target_id: PeerId::from(target),
            signal: signal.clone(),
        };
        assert_eq!(json_size(&msg), limit("RelaySignal"));
        signal
    }

    #[test]
    fn test_stamped_signal_at_relay_limit_still_fits() {
        let mut signal = relay_signal_at_limit("b");
        signal.from_peer_id = Some(max_id());
        let forwarded = ServerMessage::ReceiveSignal { signal };
        assert!(json_size(&forwarded) > limit("RelaySignal"));
        assert!(json_size(&forwarded) <= limit("ReceiveSignal"));
        assert!(json_size(&forwarded) <= MAX_FRAME_LENGTH);
    }

    #[test]
    fn test_limit_presence_and_registered() {
        for msg in [
            ServerMessage::Registered { peer_id: max_id() },
            ServerMessage::PeerConnected { peer_id: max_id() },
            ServerMessage::PeerDisconnected { peer_id: max_id() },
        ] {
            assert!(json_size(&msg) <= limit(msg.type_name()));
        }
    }

    #[test]
    fn test_limit_error() {
        let msg = ServerMessage::Error {
            message: "e".repeat(MAX_ERROR_LENGTH),
        };
        assert_eq!(json_size(&msg), 29 + MAX_ERROR_LENGTH);
        assert!(json_size(&msg) <= limit(msg.type_name()));
    }

    #[test]
    fn test_frame_length_covers_every_type() {
        for message_type in known_message_types() {
            assert!(limit(message_type) <= MAX_FRAME_LENGTH, "{message_type}");
        }
    }
}
