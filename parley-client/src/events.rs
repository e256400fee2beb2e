//! Typed event stream published to the application

use tokio::sync::mpsc;

use parley_common::PeerId;
use parley_common::channel::FileMetadata;

use crate::negotiation::NegotiationError;
use crate::transfer::{ReceivedFile, TransferDirection, TransferError};

/// Sending half of the event stream
pub type EventSender = mpsc::UnboundedSender<ClientEvent>;

/// Receiving half of the event stream, owned by the application
pub type EventReceiver = mpsc::UnboundedReceiver<ClientEvent>;

/// How a successful transfer ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletedTransfer {
    Sent(FileMetadata),
    Received(ReceivedFile),
}

/// Everything the client reports about peers and transfers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    // Presence, only when the relay broadcasts it
    PeerConnected {
        peer_id: PeerId,
    },
    PeerDisconnected {
        peer_id: PeerId,
    },

    // Channel lifecycle
    ConnectionEstablished {
        peer_id: PeerId,
    },
    ConnectionClosed {
        peer_id: PeerId,
    },
    NegotiationFailed {
        peer_id: PeerId,
        error: NegotiationError,
    },

    /// Chat text received over the channel
    Message {
        peer_id: PeerId,
        content: String,
    },

    // Transfers
    TransferStarted {
        peer_id: PeerId,
        direction: TransferDirection,
        metadata: FileMetadata,
    },
    TransferProgress {
        peer_id: PeerId,
        direction: TransferDirection,
        percent: u8,
    },
    TransferCompleted {
        peer_id: PeerId,
        transfer: CompletedTransfer,
    },
    TransferFailed {
        peer_id: PeerId,
        direction: TransferDirection,
        error: TransferError,
    },

    /// The relay connection ended; no new negotiations can start
    RelayClosed,
}

impl ClientEvent {
    /// Remote peer this event concerns, if any
    pub fn peer_id(&self) -> Option<&PeerId> {
        match self {
            ClientEvent::PeerConnected { peer_id }
            | ClientEvent::PeerDisconnected { peer_id }
            | ClientEvent::ConnectionEstablished { peer_id }
            | ClientEvent::ConnectionClosed { peer_id }
            | ClientEvent::NegotiationFailed { peer_id, .. }
            | ClientEvent::Message { peer_id, .. }
            | ClientEvent::TransferStarted { peer_id, .. }
            | ClientEvent::TransferProgress { peer_id, .. }
            | ClientEvent::TransferCompleted { peer_id, .. }
            | ClientEvent::TransferFailed { peer_id, .. } => Some(peer_id),
            ClientEvent::RelayClosed => None,
        }
    }
}
