//! Signaling relay
//!
//! Forwards negotiation envelopes between registered peers. Each transport
//! session moves through `Connected` (attached, no identity) → `Registered`
//! (identity in the registry) → `Disconnected`. Every failure here is a
//! silent drop; nothing is reported back to the sender.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};

use parley_common::io::check_server_message_size;
use parley_common::validators::validate_peer_id;
use parley_common::{PeerId, ServerMessage, SignalEnvelope};

use crate::registry::{ConnectionRegistry, SessionId};

/// Channel feeding one connection's writer
pub type OutboundSender = mpsc::UnboundedSender<ServerMessage>;

/// What happened to a `RelaySignal` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Envelope was queued for the target session
    Delivered,
    /// Sender has no identity; request dropped
    SenderUnregistered,
    /// Target identity is not connected; request dropped
    TargetNotFound,
    /// The stamped envelope would exceed what receivers accept; request dropped
    TooLarge,
}

/// The relay: one registry plus the outbound channel of every live session
#[derive(Clone)]
pub struct SignalingRelay {
    registry: ConnectionRegistry,
    sessions: Arc<RwLock<HashMap<SessionId, OutboundSender>>>,
    next_session_id: Arc<AtomicU64>,
    presence: bool,
}

impl SignalingRelay {
    /// Create a relay; with `presence` set, registrations and disconnects
    /// are announced to every other registered peer
    pub fn new(presence: bool) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            next_session_id: Arc::new(AtomicU64::new(1)),
            presence,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Link a new transport session and return its id
    pub async fn attach(&self, tx: OutboundSender) -> SessionId {
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        self.sessions.write().await.insert(session_id, tx);
        debug!(session = session_id, "session attached");
        session_id
    }

    /// Handle `Register`: bind an identity to the session and reply with it
    ///
    /// A requested identity is reused when it is well-formed, otherwise a
    /// fresh one is issued.
    pub async fn on_register(&self, session_id: SessionId, requested: Option<PeerId>) -> PeerId {
        let peer_id = match requested {
            Some(id) if validate_peer_id(id.as_str()).is_ok() => id,
            Some(id) => {
                debug!(session = session_id, requested = %id, "malformed identity requested, issuing a fresh one");
                PeerId::generate()
            }
            None => PeerId::generate(),
        };

        let eviction = self.registry.register(peer_id.clone(), session_id).await;
        if let Some(old_session) = eviction.displaced_session {
            info!(peer = %peer_id, old_session, session = session_id, "identity moved to a new session");
        }
        info!(peer = %peer_id, session = session_id, "peer registered");

        self.send_to_session(
            session_id,
            ServerMessage::Registered {
                peer_id: peer_id.clone(),
            },
        )
        .await;

        if self.presence {
            if let Some(old_peer) = eviction.replaced_identity {
                self.broadcast_except(session_id, ServerMessage::PeerDisconnected { peer_id: old_peer })
                    .await;
            }
            self.broadcast_except(
                session_id,
                ServerMessage::PeerConnected {
                    peer_id: peer_id.clone(),
                },
            )
            .await;
            for (other, other_session) in self.registry.entries().await {
                if other_session != session_id {
                    self.send_to_session(session_id, ServerMessage::PeerConnected { peer_id: other })
                        .await;
                }
            }
        }

        peer_id
    }

    /// Handle `RelaySignal`: stamp the verified sender and forward to `target`
    pub async fn on_relay_signal(
        &self,
        session_id: SessionId,
        target: &PeerId,
        mut envelope: SignalEnvelope,
    ) -> RelayOutcome {
        let Some(from) = self.registry.lookup_identity(session_id).await else {
            debug!(session = session_id, "dropping signal from unregistered session");
            return RelayOutcome::SenderUnregistered;
        };

        // Never trust the caller's idea of who sent this
        envelope.from_peer_id = Some(from.clone());

        let Some(target_session) = self.registry.lookup_session(target).await else {
            debug!(from = %from, target = %target, kind = %envelope.kind, "dropping signal for unknown target");
            return RelayOutcome::TargetNotFound;
        };

        let kind = envelope.kind;
        let message = ServerMessage::ReceiveSignal { signal: envelope };
        if let Err(e) = check_server_message_size(&message) {
            debug!(from = %from, target = %target, %kind, error = %e, "dropping oversized signal");
            return RelayOutcome::TooLarge;
        }

        if self.send_to_session(target_session, message).await {
            debug!(from = %from, target = %target, %kind, "signal relayed");
            RelayOutcome::Delivered
        } else {
            RelayOutcome::TargetNotFound
        }
    }

    /// Handle transport disconnect: forget the session and its identity
    pub async fn on_disconnect(&self, session_id: SessionId) {
        self.sessions.write().await.remove(&session_id);

        let Some(peer_id) = self.registry.remove_by_session(session_id).await else {
            debug!(session = session_id, "unregistered session closed");
            return;
        };
        info!(peer = %peer_id, session = session_id, "peer disconnected");

        if self.presence {
            self.broadcast_except(session_id, ServerMessage::PeerDisconnected { peer_id })
                .await;
        }
    }

    /// Queue a message for one session; false if the session is gone
    async fn send_to_session(&self, session_id: SessionId, message: ServerMessage) -> bool {
        let sessions = self.sessions.read().await;
        match sessions.get(&session_id) {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Queue a message for every registered session except one
    async fn broadcast_except(&self, skip: SessionId, message: ServerMessage) {
        for (_, session_id) in self.registry.entries().await {
            if session_id != skip {
                self.send_to_session(session_id, message.clone()).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn attach(relay: &SignalingRelay) -> (SessionId, UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (relay.attach(tx).await, rx)
    }

    async fn register(
        relay: &SignalingRelay,
        id: &str,
    ) -> (SessionId, UnboundedReceiver<ServerMessage>) {
        let (session_id, mut rx) = attach(relay).await;
        let peer_id = relay.on_register(session_id, Some(PeerId::from(id))).await;
        assert_eq!(peer_id.as_str(), id);
        assert_eq!(
            rx.try_recv().unwrap(),
            ServerMessage::Registered { peer_id }
        );
        (session_id, rx)
    }

    #[tokio::test]
    async fn test_register_issues_fresh_identity() {
        let relay = SignalingRelay::new(false);
        let (session_id, mut rx) = attach(&relay).await;

        let peer_id = relay.on_register(session_id, None).await;
        assert_eq!(
            rx.try_recv().unwrap(),
            ServerMessage::Registered {
                peer_id: peer_id.clone()
            }
        );
        assert_eq!(relay.registry().lookup_identity(session_id).await, Some(peer_id));
    }

    #[tokio::test]
    async fn test_register_reuses_existing_identity() {
        let relay = SignalingRelay::new(false);
        let (session_id, _rx) = register(&relay, "a1").await;
        assert_eq!(
            relay.registry().lookup_session(&PeerId::from("a1")).await,
            Some(session_id)
        );
    }

    #[tokio::test]
    async fn test_register_replaces_malformed_identity() {
        let relay = SignalingRelay::new(false);
        let (session_id, _rx) = attach(&relay).await;
        let peer_id = relay
            .on_register(session_id, Some(PeerId::from("has space")))
            .await;
        assert_ne!(peer_id.as_str(), "has space");
    }

    #[tokio::test]
    async fn test_relay_signal_delivers_to_target() {
        let relay = SignalingRelay::new(false);
        let (a, _a_rx) = register(&relay, "a1").await;
        let (_b, mut b_rx) = register(&relay, "b1").await;

        let outcome = relay
            .on_relay_signal(a, &PeerId::from("b1"), SignalEnvelope::offer(json!("v=0")))
            .await;
        assert_eq!(outcome, RelayOutcome::Delivered);

        let ServerMessage::ReceiveSignal { signal } = b_rx.try_recv().unwrap() else {
            panic!("expected ReceiveSignal");
        };
        assert_eq!(signal.payload, json!("v=0"));
        assert_eq!(signal.from_peer_id, Some(PeerId::from("a1")));
    }

    #[tokio::test]
    async fn test_forged_sender_is_overwritten() {
        let relay = SignalingRelay::new(false);
        let (a, _a_rx) = register(&relay, "a1").await;
        let (_b, mut b_rx) = register(&relay, "b1").await;

        let mut forged = SignalEnvelope::answer(json!({"sdp": "x"}));
        forged.from_peer_id = Some(PeerId::from("mallory"));
        relay.on_relay_signal(a, &PeerId::from("b1"), forged).await;

        let ServerMessage::ReceiveSignal { signal } = b_rx.try_recv().unwrap() else {
            panic!("expected ReceiveSignal");
        };
        assert_eq!(signal.from_peer_id, Some(PeerId::from("a1")));
    }

    #[tokio::test]
    async fn test_unknown_target_is_dropped() {
        let relay = SignalingRelay::new(false);
        let (a, mut a_rx) = register(&relay, "a1").await;

        let outcome = relay
            .on_relay_signal(a, &PeerId::from("ghost"), SignalEnvelope::offer(json!(null)))
            .await;
        assert_eq!(outcome, RelayOutcome::TargetNotFound);
        // Nothing is sent back to the sender
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_signal_at_client_limit_is_relayed_within_receive_limit() {
        use parley_common::limits::max_payload_for_type;
        use parley_common::ClientMessage;
        use parley_common::validators::MAX_PEER_ID_LENGTH;

        let relay = SignalingRelay::new(false);
        let long_id = "a".repeat(MAX_PEER_ID_LENGTH);
        let (a, _a_rx) = register(&relay, &long_id).await;
        let (_b, mut b_rx) = register(&relay, "b").await;

        // Fill the request to exactly the client-side limit, sender unset
        let request_limit = max_payload_for_type("RelaySignal").unwrap() as usize;
        let mut signal = SignalEnvelope::ice_candidate(json!(""));
        let request = |signal: &SignalEnvelope| ClientMessage::RelaySignal {
            target_id: PeerId::from("b"),
            signal: signal.clone(),
        };
        let fill = request_limit - serde_json::to_vec(&request(&signal)).unwrap().len();
        signal.payload = json!("s".repeat(fill));
        assert_eq!(serde_json::to_vec(&request(&signal)).unwrap().len(), request_limit);

        let outcome = relay.on_relay_signal(a, &PeerId::from("b"), signal).await;
        assert_eq!(outcome, RelayOutcome::Delivered);

        let forwarded = b_rx.try_recv().unwrap();
        assert_eq!(check_server_message_size(&forwarded), Ok(()));
        let ServerMessage::ReceiveSignal { signal } = forwarded else {
            panic!("expected ReceiveSignal");
        };
        assert_eq!(signal.from_peer_id, Some(PeerId::new(long_id)));
    }

    #[tokio::test]
    async fn test_signal_growing_past_receive_limit_is_dropped() {
        use parley_common::limits::MAX_FRAME_LENGTH;

        let relay = SignalingRelay::new(false);
        let (a, mut a_rx) = register(&relay, "a1").await;
        let (_b, mut b_rx) = register(&relay, "b1").await;

        let oversized = SignalEnvelope::offer(json!("s".repeat(MAX_FRAME_LENGTH)));
        let outcome = relay.on_relay_signal(a, &PeerId::from("b1"), oversized).await;
        assert_eq!(outcome, RelayOutcome::TooLarge);
        assert!(b_rx.try_recv().is_err());
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregistered_sender_is_dropped() {
        let relay = SignalingRelay::new(false);
        let (anon, mut anon_rx) = attach(&relay).await;
        let (_b, mut b_rx) = register(&relay, "b1").await;

        let outcome = relay
            .on_relay_signal(anon, &PeerId::from("b1"), SignalEnvelope::offer(json!(null)))
            .await;
        assert_eq!(outcome, RelayOutcome::SenderUnregistered);
        assert!(b_rx.try_recv().is_err());
        assert!(anon_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_evicts_identity() {
        let relay = SignalingRelay::new(false);
        let (a, _a_rx) = register(&relay, "a1").await;
        let (b, _b_rx) = register(&relay, "b1").await;

        relay.on_disconnect(b).await;
        assert_eq!(relay.registry().lookup_session(&PeerId::from("b1")).await, None);

        let outcome = relay
            .on_relay_signal(a, &PeerId::from("b1"), SignalEnvelope::offer(json!(null)))
            .await;
        assert_eq!(outcome, RelayOutcome::TargetNotFound);
    }

    #[tokio::test]
    async fn test_reconnect_with_same_identity_routes_to_new_session() {
        let relay = SignalingRelay::new(false);
        let (a, _a_rx) = register(&relay, "a1").await;
        let (old_b, mut old_rx) = register(&relay, "b1").await;
        let (_new_b, mut new_rx) = register(&relay, "b1").await;

        relay
            .on_relay_signal(a, &PeerId::from("b1"), SignalEnvelope::offer(json!(1)))
            .await;
        assert!(old_rx.try_recv().is_err());
        assert!(matches!(
            new_rx.try_recv().unwrap(),
            ServerMessage::ReceiveSignal { .. }
        ));

        // The stale connection closing must not evict the new binding
        relay.on_disconnect(old_b).await;
        assert!(
            relay
                .registry()
                .lookup_session(&PeerId::from("b1"))
                .await
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_presence_announcements() {
        let relay = SignalingRelay::new(true);
        let (_a, mut a_rx) = register(&relay, "a1").await;

        let (b, mut b_rx) = attach(&relay).await;
        relay.on_register(b, Some(PeerId::from("b1"))).await;

        // Existing peer learns about the newcomer
        assert_eq!(
            a_rx.try_recv().unwrap(),
            ServerMessage::PeerConnected {
                peer_id: PeerId::from("b1")
            }
        );
        // Newcomer gets its identity, then the existing roster
        assert!(matches!(
            b_rx.try_recv().unwrap(),
            ServerMessage::Registered { .. }
        ));
        assert_eq!(
            b_rx.try_recv().unwrap(),
            ServerMessage::PeerConnected {
                peer_id: PeerId::from("a1")
            }
        );

        relay.on_disconnect(b).await;
        assert_eq!(
            a_rx.try_recv().unwrap(),
            ServerMessage::PeerDisconnected {
                peer_id: PeerId::from("b1")
            }
        );
    }

    #[tokio::test]
    async fn test_no_presence_by_default() {
        let relay = SignalingRelay::new(false);
        let (_a, mut a_rx) = register(&relay, "a1").await;
        let (b, _b_rx) = register(&relay, "b1").await;
        relay.on_disconnect(b).await;
        assert!(a_rx.try_recv().is_err());
    }
}
