//! Peer negotiation state machine
//!
//! One worker task per remote peer owns that peer's session and handles its
//! reactions strictly in arrival order: local API calls, relayed signals and
//! native transport events all go through the same queue. Workers for
//! different peers run independently. A worker stops as soon as its peer has
//! no session and nothing queued; the peer is forgotten until the next
//! connect or offer.
//!
//! ```text
//! Idle ──connect──▶ Negotiating(Initiator) ──answer, ICE, open──▶ Connected
//! Idle ──offer────▶ Negotiating(Responder) ──ICE, open──────────▶ Connected
//! Connected ──disconnect / channel close──▶ Closed
//! any failure ──▶ Idle (session removed)
//! ```

mod manager;
mod session;
mod table;
mod worker;

pub use manager::PeerManager;

use crate::native::NativeError;
use crate::signaling::SignalingError;

/// Which side of the offer/answer exchange a session is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// Channel state for one remote peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Idle,
    Negotiating(Role),
    Connected,
    Closed,
}

impl ChannelState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ChannelState::Connected)
    }

    pub fn is_negotiating(&self) -> bool {
        matches!(self, ChannelState::Negotiating(_))
    }
}

/// Why a negotiation or channel operation failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NegotiationError {
    #[error(transparent)]
    Native(#[from] NativeError),
    #[error("signaling failed: {0}")]
    Signaling(String),
    #[error("cannot negotiate with our own identity")]
    SelfConnect,
    #[error("invalid peer id: {0}")]
    InvalidPeerId(String),
    #[error("channel closed before it opened")]
    ChannelClosed,
    #[error("no open channel to peer")]
    NotConnected,
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("channel refused to send")]
    ChannelSend,
    #[error("peer manager has shut down")]
    Shutdown,
}

impl From<SignalingError> for NegotiationError {
    fn from(err: SignalingError) -> Self {
        NegotiationError::Signaling(err.to_string())
    }
}
