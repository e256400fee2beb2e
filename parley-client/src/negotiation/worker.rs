//! Per-peer reaction loop
//!
//! Every reaction for one remote peer lands in that peer's queue and is handled
//! to completion before the next one starts, so the session and the inbound
//! transfer state never see two reactions at once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};

use parley_common::channel::{ChannelMessage, FileChunk, FileMetadata};
use parley_common::validators::validate_message;
use parley_common::{PeerId, SignalEnvelope, SignalKind};

use super::session::{ChannelHandle, NegotiationSession};
use super::table::PeerTable;
use super::{ChannelState, NegotiationError, Role};
use crate::config::TransferOptions;
use crate::events::{ClientEvent, CompletedTransfer, EventSender};
use crate::native::{NativeEvent, NativeEventSink, NativeTransport, NativeTransportFactory};
use crate::signaling::SignalSender;
use crate::transfer::{TransferDirection, TransferError, TransferReceiver};

/// One thing that happened to a peer
pub(super) enum Reaction {
    Connect {
        respond_to: oneshot::Sender<Result<(), NegotiationError>>,
    },
    Disconnect {
        respond_to: oneshot::Sender<bool>,
    },
    Signal(SignalEnvelope),
    Native {
        generation: u64,
        event: NativeEvent,
    },
    /// Hand out the open channel for an outbound send
    OpenChannel {
        respond_to: oneshot::Sender<Option<ChannelHandle>>,
    },
}

/// Answer to a request, held back until the worker knows whether it retires
enum Reply {
    Connect(oneshot::Sender<Result<(), NegotiationError>>, Result<(), NegotiationError>),
    Disconnect(oneshot::Sender<bool>, bool),
    OpenChannel(oneshot::Sender<Option<ChannelHandle>>, Option<ChannelHandle>),
}

impl Reply {
    fn send(self) {
        // The caller may have given up waiting
        match self {
            Reply::Connect(tx, result) => {
                let _ = tx.send(result);
            }
            Reply::Disconnect(tx, closed) => {
                let _ = tx.send(closed);
            }
            Reply::OpenChannel(tx, channel) => {
                let _ = tx.send(channel);
            }
        }
    }
}

/// Everything the workers of one manager share
pub(super) struct WorkerContext {
    pub(super) local_id: PeerId,
    pub(super) signals: Arc<dyn SignalSender>,
    pub(super) factory: Arc<dyn NativeTransportFactory>,
    pub(super) events: EventSender,
    pub(super) options: TransferOptions,
    generations: AtomicU64,
}

impl WorkerContext {
    pub(super) fn new(
        local_id: PeerId,
        signals: Arc<dyn SignalSender>,
        factory: Arc<dyn NativeTransportFactory>,
        events: EventSender,
        options: TransferOptions,
    ) -> Self {
        Self {
            local_id,
            signals,
            factory,
            events,
            options,
            generations: AtomicU64::new(0),
        }
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(super) fn emit(&self, event: ClientEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }
}

pub(super) struct PeerWorker {
    peer_id: PeerId,
    context: Arc<WorkerContext>,
    table: Weak<PeerTable>,
    state: Arc<watch::Sender<ChannelState>>,
    /// Weak so that sinks held by native transports do not keep the worker alive
    queue: mpsc::WeakUnboundedSender<Reaction>,
    session: Option<NegotiationSession>,
    receiver: TransferReceiver,
}

impl PeerWorker {
    /// Start the worker for `peer_id`, publishing on `state`, and return its queue
    pub(super) fn spawn(
        peer_id: PeerId,
        context: Arc<WorkerContext>,
        table: Weak<PeerTable>,
        state: Arc<watch::Sender<ChannelState>>,
    ) -> mpsc::UnboundedSender<Reaction> {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = PeerWorker {
            receiver: TransferReceiver::new(&context.options),
            peer_id,
            context,
            table,
            state,
            queue: tx.downgrade(),
            session: None,
        };
        tokio::spawn(worker.run(rx));
        tx
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Reaction>) {
        trace!(peer = %self.peer_id, "peer worker started");

        while let Some(reaction) = rx.recv().await {
            let reply = self.react(reaction).await;

            // A caller that got its reply must not find this worker listed
            let retired = self.session.is_none() && self.retire(&rx);
            if let Some(reply) = reply {
                reply.send();
            }
            if retired {
                trace!(peer = %self.peer_id, "peer worker retired");
                return;
            }
        }

        self.close_session().await;
        trace!(peer = %self.peer_id, "peer worker stopped");
    }

    async fn react(&mut self, reaction: Reaction) -> Option<Reply> {
        match reaction {
            Reaction::Connect { respond_to } => {
                let result = self.connect().await;
                Some(Reply::Connect(respond_to, result))
            }
            Reaction::Disconnect { respond_to } => {
                let closed = self.close_session().await;
                Some(Reply::Disconnect(respond_to, closed))
            }
            Reaction::Signal(envelope) => {
                self.on_signal(envelope).await;
                None
            }
            Reaction::Native { generation, event } => {
                self.on_native(generation, event).await;
                None
            }
            Reaction::OpenChannel { respond_to } => {
                let channel = self
                    .session
                    .as_ref()
                    .filter(|s| s.connected)
                    .map(NegotiationSession::channel);
                Some(Reply::OpenChannel(respond_to, channel))
            }
        }
    }

    /// Leave the peer table if nothing is queued; true when the worker should stop
    fn retire(&self, rx: &mpsc::UnboundedReceiver<Reaction>) -> bool {
        let (Some(table), Some(own)) = (self.table.upgrade(), self.queue.upgrade()) else {
            // Manager is gone; drain what is left, then stop
            return rx.is_empty();
        };
        table.retire(&self.peer_id, &own, rx)
    }

    fn set_state(&self, state: ChannelState) {
        self.state.send_replace(state);
    }

    /// Sink that feeds native events for `generation` back into this queue
    fn sink(&self, generation: u64) -> NativeEventSink {
        let queue = self.queue.clone();
        NativeEventSink::new(move |event| match queue.upgrade() {
            Some(tx) => tx.send(Reaction::Native { generation, event }).is_ok(),
            None => false,
        })
    }

    async fn signal(&self, envelope: SignalEnvelope) -> Result<(), NegotiationError> {
        self.context
            .signals
            .send_signal(&self.peer_id, envelope)
            .await
            .map_err(NegotiationError::from)
    }

    /// Replace whatever session exists with a fresh one in `role`
    async fn start_session(&mut self, role: Role) -> Result<Arc<dyn NativeTransport>, NegotiationError> {
        if let Some(old) = &self.session {
            debug!(peer = %self.peer_id, generation = old.generation, "replacing existing session");
            self.close_session().await;
        }

        let generation = self.context.next_generation();
        let transport = self.context.factory.create(
            &self.peer_id,
            role == Role::Initiator,
            self.sink(generation),
        )?;
        self.session = Some(NegotiationSession::new(role, generation, transport.clone()));
        self.set_state(ChannelState::Negotiating(role));
        debug!(peer = %self.peer_id, generation, ?role, "negotiation started");
        Ok(transport)
    }

    /// Tear the session down after a failure and report it
    async fn fail(&mut self, error: NegotiationError) -> NegotiationError {
        warn!(peer = %self.peer_id, %error, "negotiation failed");
        if let Some(session) = self.session.take() {
            session.teardown().await;
        }
        self.abort_inbound();
        self.set_state(ChannelState::Idle);
        self.context.emit(ClientEvent::NegotiationFailed {
            peer_id: self.peer_id.clone(),
            error: error.clone(),
        });
        error
    }

    /// Close the current session; false if there was none
    async fn close_session(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        let was_connected = session.connected;
        session.teardown().await;
        self.abort_inbound();
        self.set_state(ChannelState::Closed);

        if was_connected {
            info!(peer = %self.peer_id, "connection closed");
            self.context.emit(ClientEvent::ConnectionClosed {
                peer_id: self.peer_id.clone(),
            });
        }
        true
    }

    async fn connect(&mut self) -> Result<(), NegotiationError> {
        match self.send_offer().await {
            Ok(()) => Ok(()),
            Err(error) => Err(self.fail(error).await),
        }
    }

    async fn send_offer(&mut self) -> Result<(), NegotiationError> {
        let transport = self.start_session(Role::Initiator).await?;
        let offer = transport.create_local_offer().await?;
        self.signal(SignalEnvelope::offer(offer)).await
    }

    async fn send_answer(&mut self, offer: Value) -> Result<(), NegotiationError> {
        let transport = self.start_session(Role::Responder).await?;
        let answer = transport.create_local_answer(offer).await?;
        self.signal(SignalEnvelope::answer(answer)).await
    }

    /// Both sides offered at once and this one keeps the initiator role
    ///
    /// The lower identity wins, so exactly one side answers.
    fn wins_glare(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.role == Role::Initiator && !s.connected && !s.remote_answer_applied)
            && self.context.local_id < self.peer_id
    }

    async fn on_signal(&mut self, envelope: SignalEnvelope) {
        let result = match envelope.kind {
            SignalKind::Offer if self.wins_glare() => {
                debug!(peer = %self.peer_id, "ignoring competing offer, staying initiator");
                Ok(())
            }
            SignalKind::Offer => self.send_answer(envelope.payload).await,
            SignalKind::Answer => self.apply_answer(envelope.payload).await,
            SignalKind::IceCandidate => self.add_candidate(envelope.payload).await,
        };
        if let Err(error) = result {
            self.fail(error).await;
        }
    }

    async fn apply_answer(&mut self, answer: Value) -> Result<(), NegotiationError> {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|s| s.role == Role::Initiator && !s.remote_answer_applied)
        else {
            debug!(peer = %self.peer_id, "dropping unexpected answer");
            return Ok(());
        };
        session.remote_answer_applied = true;
        let transport = session.transport.clone();
        transport.apply_remote_answer(answer).await?;
        Ok(())
    }

    async fn add_candidate(&mut self, candidate: Value) -> Result<(), NegotiationError> {
        let Some(session) = &self.session else {
            debug!(peer = %self.peer_id, "dropping candidate without a session");
            return Ok(());
        };
        let transport = session.transport.clone();
        transport.add_remote_candidate(candidate).await?;
        Ok(())
    }

    async fn on_native(&mut self, generation: u64, event: NativeEvent) {
        let Some(session) = self.session.as_mut().filter(|s| s.generation == generation) else {
            trace!(peer = %self.peer_id, generation, "ignoring event from a retired session");
            return;
        };

        match event {
            NativeEvent::CandidateDiscovered(candidate) => {
                let connected = session.connected;
                if let Err(error) = self.signal(SignalEnvelope::ice_candidate(candidate)).await {
                    if connected {
                        warn!(peer = %self.peer_id, %error, "failed to relay late candidate");
                    } else {
                        self.fail(error).await;
                    }
                }
            }
            NativeEvent::ChannelOpen => {
                if session.connected {
                    return;
                }
                session.connected = true;
                self.set_state(ChannelState::Connected);
                info!(peer = %self.peer_id, generation, "connection established");
                self.context.emit(ClientEvent::ConnectionEstablished {
                    peer_id: self.peer_id.clone(),
                });
            }
            NativeEvent::ChannelClose => {
                if session.connected {
                    self.close_session().await;
                } else {
                    self.fail(NegotiationError::ChannelClosed).await;
                }
            }
            NativeEvent::Message(bytes) => self.on_channel_message(&bytes),
        }
    }

    fn on_channel_message(&mut self, bytes: &[u8]) {
        let message = match ChannelMessage::from_bytes(bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!(peer = %self.peer_id, error = %e, "dropping malformed channel frame");
                return;
            }
        };

        match message {
            ChannelMessage::Message { content } => match validate_message(&content) {
                Ok(()) => self.context.emit(ClientEvent::Message {
                    peer_id: self.peer_id.clone(),
                    content,
                }),
                Err(e) => warn!(peer = %self.peer_id, error = ?e, "dropping invalid chat message"),
            },
            ChannelMessage::FileStart { metadata } => self.on_file_start(metadata),
            ChannelMessage::FileChunk { chunk } => self.on_file_chunk(&chunk),
            ChannelMessage::FileEnd => self.on_file_end(),
        }
    }

    fn on_file_start(&mut self, metadata: FileMetadata) {
        self.abort_inbound();

        match self.receiver.on_file_start(metadata.clone()) {
            Ok(()) => {
                info!(peer = %self.peer_id, name = %metadata.name, size = metadata.size, "receiving file");
                self.context.emit(ClientEvent::TransferStarted {
                    peer_id: self.peer_id.clone(),
                    direction: TransferDirection::Receive,
                    metadata,
                });
            }
            Err(error) => self.inbound_failed(error),
        }
    }

    fn on_file_chunk(&mut self, chunk: &FileChunk) {
        if !self.receiver.is_active() {
            debug!(peer = %self.peer_id, index = chunk.index, "dropping chunk outside a transfer");
            return;
        }
        match self.receiver.on_file_chunk(chunk) {
            Ok(Some(percent)) => self.context.emit(ClientEvent::TransferProgress {
                peer_id: self.peer_id.clone(),
                direction: TransferDirection::Receive,
                percent,
            }),
            Ok(None) => {}
            Err(error) => self.inbound_failed(error),
        }
    }

    fn on_file_end(&mut self) {
        if !self.receiver.is_active() {
            debug!(peer = %self.peer_id, "dropping file-end outside a transfer");
            return;
        }
        match self.receiver.on_file_end() {
            Ok(file) => {
                info!(peer = %self.peer_id, name = %file.metadata.name, "file received");
                self.context.emit(ClientEvent::TransferProgress {
                    peer_id: self.peer_id.clone(),
                    direction: TransferDirection::Receive,
                    percent: 100,
                });
                self.context.emit(ClientEvent::TransferCompleted {
                    peer_id: self.peer_id.clone(),
                    transfer: CompletedTransfer::Received(file),
                });
            }
            Err(error) => self.inbound_failed(error),
        }
    }

    fn inbound_failed(&self, error: TransferError) {
        warn!(peer = %self.peer_id, %error, "inbound transfer failed");
        self.context.emit(ClientEvent::TransferFailed {
            peer_id: self.peer_id.clone(),
            direction: TransferDirection::Receive,
            error,
        });
    }

    /// Discard an unfinished inbound file
    fn abort_inbound(&mut self) {
        if let Some(metadata) = self.receiver.abort() {
            debug!(peer = %self.peer_id, name = %metadata.name, "inbound transfer cancelled");
            self.inbound_failed(TransferError::Cancelled);
        }
    }
}
