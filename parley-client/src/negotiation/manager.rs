//! Multi-peer front of the negotiation engine

use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use parley_common::channel::ChannelMessage;
use parley_common::validators::{validate_message, validate_peer_id};
use parley_common::{PeerId, SignalEnvelope, SignalKind};

use super::session::ChannelHandle;
use super::table::PeerTable;
use super::worker::{PeerWorker, Reaction, WorkerContext};
use super::{ChannelState, NegotiationError};
use crate::config::TransferOptions;
use crate::events::{ClientEvent, CompletedTransfer, EventSender};
use crate::native::{NativeEvent, NativeTransportFactory};
use crate::signaling::SignalSender;
use crate::transfer::{OutgoingFile, TransferDirection, TransferError, sender};

struct Inner {
    context: Arc<WorkerContext>,
    table: Arc<PeerTable>,
}

/// Negotiation sessions with any number of remote peers
///
/// Cheap to clone; clones share the same sessions. A peer is tracked only
/// while it has a session: once that ends it is forgotten and [`Self::state`]
/// reports [`ChannelState::Idle`] for it again.
#[derive(Clone)]
pub struct PeerManager {
    inner: Arc<Inner>,
}

impl PeerManager {
    pub fn new(
        local_id: PeerId,
        signals: Arc<dyn SignalSender>,
        factory: Arc<dyn NativeTransportFactory>,
        options: TransferOptions,
        events: EventSender,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                context: Arc::new(WorkerContext::new(local_id, signals, factory, events, options)),
                table: Arc::new(PeerTable::default()),
            }),
        }
    }

    pub fn local_id(&self) -> &PeerId {
        &self.inner.context.local_id
    }

    /// Queue `reaction` for `peer`, starting its worker if needed
    fn deliver(&self, peer: &PeerId, reaction: Reaction) -> Result<(), NegotiationError> {
        self.inner.table.send_or_spawn(peer, reaction, |state| {
            PeerWorker::spawn(
                peer.clone(),
                self.inner.context.clone(),
                Arc::downgrade(&self.inner.table),
                state,
            )
        })
    }

    /// Ask the running worker of `peer`; `None` if it has none
    async fn request<T>(
        &self,
        peer: &PeerId,
        make: impl FnOnce(oneshot::Sender<T>) -> Reaction,
    ) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        if !self.inner.table.send(peer, make(tx)) {
            return None;
        }
        rx.await.ok()
    }

    /// Start negotiating with `target` as the initiator
    ///
    /// Returns once the offer has been handed to the relay. An existing
    /// session with `target` is torn down first. Watch [`Self::state`] or
    /// the event stream for the channel opening.
    pub async fn connect(&self, target: &PeerId) -> Result<(), NegotiationError> {
        validate_peer_id(target.as_str())
            .map_err(|e| NegotiationError::InvalidPeerId(format!("{target}: {e:?}")))?;
        if target == self.local_id() {
            return Err(NegotiationError::SelfConnect);
        }

        let (tx, rx) = oneshot::channel();
        self.deliver(target, Reaction::Connect { respond_to: tx })?;
        rx.await.map_err(|_| NegotiationError::Shutdown)?
    }

    /// Close the session with `peer`, returning whether there was one
    pub async fn disconnect(&self, peer: &PeerId) -> bool {
        self.request(peer, |respond_to| Reaction::Disconnect { respond_to })
            .await
            .unwrap_or(false)
    }

    /// Route an envelope received from the relay to its peer's worker
    ///
    /// Only an offer starts a new worker. Anything else for a peer without a
    /// session is dropped.
    pub fn handle_signal(&self, envelope: SignalEnvelope) {
        let Some(from) = envelope.from_peer_id.clone() else {
            warn!(kind = %envelope.kind, "dropping signal without sender");
            return;
        };
        if &from == self.local_id() {
            warn!(kind = %envelope.kind, "dropping signal from ourselves");
            return;
        }

        let kind = envelope.kind;
        let delivered = if kind == SignalKind::Offer {
            self.deliver(&from, Reaction::Signal(envelope)).is_ok()
        } else {
            self.inner.table.send(&from, Reaction::Signal(envelope))
        };
        if !delivered {
            debug!(peer = %from, %kind, "dropping signal for unknown peer");
        }
    }

    /// Feed a native transport event in from outside the transport's own sink
    ///
    /// Events whose generation is not the peer's current session are ignored.
    pub fn handle_native_event(&self, peer: &PeerId, generation: u64, event: NativeEvent) {
        self.inner
            .table
            .send(peer, Reaction::Native { generation, event });
    }

    /// Current channel state with `peer`
    pub fn state(&self, peer: &PeerId) -> ChannelState {
        self.inner.table.state(peer)
    }

    /// Watch the channel state with `peer`
    ///
    /// Subscribing does not start negotiating. The receiver also sees any
    /// later session with the same peer.
    pub fn subscribe_state(&self, peer: &PeerId) -> Result<watch::Receiver<ChannelState>, NegotiationError> {
        self.inner.table.subscribe(peer)
    }

    /// Wait until the channel state with `peer` equals `target`
    pub async fn wait_for_state(
        &self,
        peer: &PeerId,
        target: ChannelState,
    ) -> Result<ChannelState, NegotiationError> {
        let mut state = self.subscribe_state(peer)?;
        let reached = state
            .wait_for(|current| *current == target)
            .await
            .map_err(|_| NegotiationError::Shutdown)?;
        Ok(*reached)
    }

    /// Every peer with a session, sorted by identity
    pub fn known_peers(&self) -> Vec<(PeerId, ChannelState)> {
        let mut peers = self.inner.table.active();
        peers.sort_by(|a, b| a.0.cmp(&b.0));
        peers
    }

    async fn open_channel(&self, peer: &PeerId) -> Option<ChannelHandle> {
        self.request(peer, |respond_to| Reaction::OpenChannel { respond_to })
            .await
            .flatten()
    }

    /// Send one chat message over the open channel
    pub async fn send_message(&self, peer: &PeerId, content: &str) -> Result<(), NegotiationError> {
        validate_message(content).map_err(|e| NegotiationError::InvalidMessage(format!("{e:?}")))?;
        let channel = self
            .open_channel(peer)
            .await
            .ok_or(NegotiationError::NotConnected)?;

        let message = ChannelMessage::Message {
            content: content.to_string(),
        };
        sender::send_frame(channel.transport.as_ref(), &message)
            .await
            .map_err(|_| NegotiationError::ChannelSend)
    }

    /// Send a file over the open channel
    ///
    /// Size and name are checked before anything is sent. Progress and the
    /// outcome are also published on the event stream once the transfer has
    /// started. Closing the session cancels the transfer.
    pub async fn send_file(&self, peer: &PeerId, file: &OutgoingFile) -> Result<(), TransferError> {
        let context = &self.inner.context;
        let plan = sender::plan(file, &context.options)?;
        let channel = self
            .open_channel(peer)
            .await
            .ok_or(TransferError::NotConnected)?;
        let _slot = channel.begin_send().ok_or(TransferError::Busy)?;

        info!(peer = %peer, name = %plan.metadata.name, size = plan.metadata.size, chunks = plan.total_chunks, "sending file");
        context.emit(ClientEvent::TransferStarted {
            peer_id: peer.clone(),
            direction: TransferDirection::Send,
            metadata: plan.metadata.clone(),
        });

        let result = sender::run(
            channel.transport.as_ref(),
            file,
            &plan,
            context.options.chunk_delay(),
            &channel.cancel,
            |percent| {
                context.emit(ClientEvent::TransferProgress {
                    peer_id: peer.clone(),
                    direction: TransferDirection::Send,
                    percent,
                })
            },
        )
        .await;

        match &result {
            Ok(()) => context.emit(ClientEvent::TransferCompleted {
                peer_id: peer.clone(),
                transfer: CompletedTransfer::Sent(plan.metadata),
            }),
            Err(error) => {
                warn!(peer = %peer, %error, "outbound transfer failed");
                context.emit(ClientEvent::TransferFailed {
                    peer_id: peer.clone(),
                    direction: TransferDirection::Send,
                    error: error.clone(),
                });
            }
        }
        result
    }

    /// Close every session and stop all workers
    ///
    /// Later calls fail with [`NegotiationError::Shutdown`].
    pub async fn shutdown(&self) {
        for (peer, queue) in self.inner.table.close() {
            let (tx, rx) = oneshot::channel();
            if queue.send(Reaction::Disconnect { respond_to: tx }).is_err() {
                continue;
            }
            if rx.await.unwrap_or(false) {
                debug!(peer = %peer, "session closed on shutdown");
            }
        }
    }
}
