//! Relay protocol definitions for Parley
//!
//! All relay messages are JSON text frames over a WebSocket, tagged by a
//! `type` field. The relay only ever carries session-negotiation envelopes;
//! chat text and file data travel over the peer-to-peer channel
//! (see [`crate::channel`]).
//!
//! ## Identity Spoofing
//!
//! Clients may put anything in [`SignalEnvelope::from_peer_id`]. The relay
//! overwrites it with the registry-verified identity of the sending
//! connection before delivery, so receivers can trust the field.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Relay-issued identity of a peer
///
/// Opaque to everything except the relay that issued it. Fresh identities are
/// UUID v4 strings, but a client may present any previously issued identity
/// when it reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Wrap an existing identity string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh, globally unique identity
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Kind of negotiation message carried by a [`SignalEnvelope`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    /// Session description offered by the initiator
    Offer,
    /// Session description answered by the responder
    Answer,
    /// Connectivity candidate discovered by either side
    IceCandidate,
}

impl SignalKind {
    /// Wire name, as used in the `kind` field
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice-candidate",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One negotiation message passed through the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalEnvelope {
    pub kind: SignalKind,
    /// Session description or candidate, opaque to the relay
    pub payload: serde_json::Value,
    /// Sender identity; untrusted until the relay has rewritten it
    #[serde(default)]
    pub from_peer_id: Option<PeerId>,
}

impl SignalEnvelope {
    pub fn new(kind: SignalKind, payload: serde_json::Value) -> Self {
        Self {
            kind,
            payload,
            from_peer_id: None,
        }
    }

    pub fn offer(payload: serde_json::Value) -> Self {
        Self::new(SignalKind::Offer, payload)
    }

    pub fn answer(payload: serde_json::Value) -> Self {
        Self::new(SignalKind::Answer, payload)
    }

    pub fn ice_candidate(payload: serde_json::Value) -> Self {
        Self::new(SignalKind::IceCandidate, payload)
    }
}

/// Client request messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Claim an identity on the relay, optionally reusing a previous one
    Register {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        existing_id: Option<PeerId>,
    },
    /// Forward a negotiation envelope to another registered peer
    RelaySignal {
        target_id: PeerId,
        signal: SignalEnvelope,
    },
}

impl ClientMessage {
    /// Value of the `type` tag for this message
    pub fn type_name(&self) -> &'static str {
        match self {
            ClientMessage::Register { .. } => "Register",
            ClientMessage::RelaySignal { .. } => "RelaySignal",
        }
    }
}

/// Relay response and event messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Reply to `Register` with the identity now bound to this connection
    Registered { peer_id: PeerId },
    /// A negotiation envelope from another peer, with a verified sender
    ReceiveSignal { signal: SignalEnvelope },
    /// Presence: another peer registered
    PeerConnected { peer_id: PeerId },
    /// Presence: another peer's connection ended
    PeerDisconnected { peer_id: PeerId },
    /// The relay is about to drop this connection
    Error { message: String },
}

impl ServerMessage {
    /// Value of the `type` tag for this message
    pub fn type_name(&self) -> &'static str {
        match self {
            ServerMessage::Registered { .. } => "Registered",
            ServerMessage::ReceiveSignal { .. } => "ReceiveSignal",
            ServerMessage::PeerConnected { .. } => "PeerConnected",
            ServerMessage::PeerDisconnected { .. } => "PeerDisconnected",
            ServerMessage::Error { .. } => "Error",
        }
    }
}
