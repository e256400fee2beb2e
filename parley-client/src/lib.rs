//! Parley peer library
//!
//! Registers with a Parley relay, negotiates point-to-point channels with
//! other peers through it, and moves chat messages and chunked files over
//! those channels. The channel itself comes from a [`native`] transport
//! supplied by the application.

pub mod client;
pub mod config;
pub mod events;
pub mod native;
pub mod negotiation;
pub mod signaling;
pub mod transfer;

pub use client::{ClientError, ParleyClient};
pub use config::{ClientConfig, TransferOptions};
pub use events::{ClientEvent, CompletedTransfer, EventReceiver};
pub use negotiation::{ChannelState, NegotiationError, PeerManager, Role};
pub use transfer::{OutgoingFile, ReceivedFile, TransferDirection, TransferError};
