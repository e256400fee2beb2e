//! Relay connection wired to the negotiation engine

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use parley_common::PeerId;

use crate::config::{ClientConfig, ConfigError};
use crate::events::{ClientEvent, EventReceiver, EventSender};
use crate::native::NativeTransportFactory;
use crate::negotiation::{ChannelState, NegotiationError, PeerManager};
use crate::signaling::{SignalingClient, SignalingError, SignalingEvent};
use crate::transfer::{OutgoingFile, TransferError};

/// Failure to bring a client up
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Signaling(#[from] SignalingError),
}

/// A registered peer that can negotiate channels with other peers
///
/// Relay traffic is dispatched on a background task. Everything the
/// application needs to react to arrives on the [`EventReceiver`] returned by
/// [`ParleyClient::connect`].
pub struct ParleyClient {
    signaling: Arc<SignalingClient>,
    peers: PeerManager,
}

impl ParleyClient {
    /// Register with the configured relay and start dispatching
    pub async fn connect(
        config: &ClientConfig,
        factory: Arc<dyn NativeTransportFactory>,
    ) -> Result<(Self, EventReceiver), ClientError> {
        config.validate()?;

        let (signaling, relay_events) =
            SignalingClient::connect(&config.relay_url, config.peer_id.clone()).await?;
        let signaling = Arc::new(signaling);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let peers = PeerManager::new(
            signaling.peer_id().clone(),
            signaling.clone(),
            factory,
            config.transfer.clone(),
            events_tx.clone(),
        );
        tokio::spawn(dispatch(relay_events, peers.clone(), events_tx));

        Ok((Self { signaling, peers }, events_rx))
    }

    /// Identity the relay assigned; store it in the config to keep it
    pub fn peer_id(&self) -> &PeerId {
        self.signaling.peer_id()
    }

    pub fn is_relay_connected(&self) -> bool {
        self.signaling.is_connected()
    }

    /// The underlying engine, for callers that need more than this facade
    pub fn peers(&self) -> &PeerManager {
        &self.peers
    }

    pub async fn connect_peer(&self, target: &PeerId) -> Result<(), NegotiationError> {
        self.peers.connect(target).await
    }

    pub async fn disconnect_peer(&self, peer: &PeerId) -> bool {
        self.peers.disconnect(peer).await
    }

    pub fn state(&self, peer: &PeerId) -> ChannelState {
        self.peers.state(peer)
    }

    pub fn subscribe_state(&self, peer: &PeerId) -> Result<watch::Receiver<ChannelState>, NegotiationError> {
        self.peers.subscribe_state(peer)
    }

    pub async fn wait_for_state(
        &self,
        peer: &PeerId,
        target: ChannelState,
    ) -> Result<ChannelState, NegotiationError> {
        self.peers.wait_for_state(peer, target).await
    }

    pub async fn send_message(&self, peer: &PeerId, content: &str) -> Result<(), NegotiationError> {
        self.peers.send_message(peer, content).await
    }

    pub async fn send_file(&self, peer: &PeerId, file: &OutgoingFile) -> Result<(), TransferError> {
        self.peers.send_file(peer, file).await
    }

    /// Close every channel, then the relay connection
    pub async fn shutdown(&self) {
        self.peers.shutdown().await;
        self.signaling.shutdown();
        info!(peer = %self.peer_id(), "client shut down");
    }
}

/// Forward relay events until the relay connection ends
async fn dispatch(
    mut relay: mpsc::UnboundedReceiver<SignalingEvent>,
    peers: PeerManager,
    events: EventSender,
) {
    while let Some(event) = relay.recv().await {
        match event {
            SignalingEvent::Signal(envelope) => peers.handle_signal(envelope),
            SignalingEvent::PeerConnected(peer_id) => {
                let _ = events.send(ClientEvent::PeerConnected { peer_id });
            }
            SignalingEvent::PeerDisconnected(peer_id) => {
                let _ = events.send(ClientEvent::PeerDisconnected { peer_id });
            }
            SignalingEvent::Error(message) => warn!(%message, "relay reported an error"),
            SignalingEvent::Closed => break,
        }
    }

    info!(peer = %peers.local_id(), "relay connection closed");
    let _ = events.send(ClientEvent::RelayClosed);
}
