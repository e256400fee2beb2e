//! Relay connection
//!
//! Registers with the relay, then runs separate reader and writer tasks so a
//! pending read is never cancelled mid-frame by an outgoing write. The two
//! tasks share a stop flag; whichever ends first tells the other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use parley_common::io::{read_server_message, send_client_message};
use parley_common::{ClientMessage, FrameError, PeerId, ServerMessage, SignalEnvelope};

/// How long the relay has to confirm a registration
pub const REGISTER_TIMEOUT: Duration = Duration::from_secs(10);

/// Failure talking to the relay
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalingError {
    #[error("failed to connect to relay: {0}")]
    Connect(String),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("relay rejected registration: {0}")]
    Rejected(String),
    #[error("unexpected {0} while registering")]
    UnexpectedMessage(&'static str),
    #[error("relay did not confirm registration in time")]
    RegisterTimeout,
    #[error("relay connection closed")]
    Closed,
}

/// Something the relay pushed to this client
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    /// A negotiation envelope; `from_peer_id` is relay-verified
    Signal(SignalEnvelope),
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
    /// The relay reported an error before closing
    Error(String),
    /// The connection is gone; no more events follow
    Closed,
}

/// Outbound half of signaling, as the negotiation engine sees it
#[async_trait]
pub trait SignalSender: Send + Sync {
    /// Ask the relay to deliver `signal` to `target`
    ///
    /// Success only means the relay will see the request; delivery is never
    /// confirmed.
    async fn send_signal(&self, target: &PeerId, signal: SignalEnvelope) -> Result<(), SignalingError>;
}

/// A registered connection to the relay
pub struct SignalingClient {
    peer_id: PeerId,
    tx: mpsc::UnboundedSender<ClientMessage>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    stop_flag: Arc<AtomicBool>,
}

impl SignalingClient {
    /// Connect to `url`, register, and start the background tasks
    ///
    /// `existing_id` reclaims a previously issued identity. The returned
    /// receiver yields relay events until [`SignalingEvent::Closed`].
    pub async fn connect(
        url: &str,
        existing_id: Option<PeerId>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SignalingEvent>), SignalingError> {
        let (socket, _response) = connect_async(url)
            .await
            .map_err(|e| SignalingError::Connect(e.to_string()))?;
        Self::from_socket(socket, existing_id).await
    }

    /// Register over an already-open WebSocket
    pub async fn from_socket<S>(
        mut socket: S,
        existing_id: Option<PeerId>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SignalingEvent>), SignalingError>
    where
        S: Stream<Item = Result<Message, tungstenite::Error>>
            + Sink<Message, Error = tungstenite::Error>
            + Unpin
            + Send
            + 'static,
    {
        send_client_message(&mut socket, &ClientMessage::Register { existing_id }).await?;
        let peer_id = tokio::time::timeout(REGISTER_TIMEOUT, await_registered(&mut socket))
            .await
            .map_err(|_| SignalingError::RegisterTimeout)??;
        info!(peer = %peer_id, "registered with relay");

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let (writer, reader) = socket.split();
        let stop_flag = Arc::new(AtomicBool::new(false));
        tokio::spawn(reader_task(reader, event_tx, stop_flag.clone()));
        tokio::spawn(writer_task(writer, cmd_rx, shutdown_rx, stop_flag.clone()));

        let client = Self {
            peer_id,
            tx: cmd_tx,
            shutdown: Mutex::new(Some(shutdown_tx)),
            stop_flag,
        };
        Ok((client, event_rx))
    }

    /// Identity the relay assigned to this client
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Whether the connection is still up
    pub fn is_connected(&self) -> bool {
        !self.stop_flag.load(Ordering::Relaxed)
    }

    /// Close the relay connection
    pub fn shutdown(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        let handle = self
            .shutdown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(tx) = handle {
            let _ = tx.send(());
        }
    }
}

#[async_trait]
impl SignalSender for SignalingClient {
    async fn send_signal(&self, target: &PeerId, signal: SignalEnvelope) -> Result<(), SignalingError> {
        if !self.is_connected() {
            return Err(SignalingError::Closed);
        }
        debug!(target = %target, kind = %signal.kind, "relaying signal");
        self.tx
            .send(ClientMessage::RelaySignal {
                target_id: target.clone(),
                signal,
            })
            .map_err(|_| SignalingError::Closed)
    }
}

/// Wait for the relay to answer `Register`
async fn await_registered<R>(reader: &mut R) -> Result<PeerId, SignalingError>
where
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    match read_server_message(reader).await? {
        Some(ServerMessage::Registered { peer_id }) => Ok(peer_id),
        Some(ServerMessage::Error { message }) => Err(SignalingError::Rejected(message)),
        Some(other) => Err(SignalingError::UnexpectedMessage(other.type_name())),
        None => Err(SignalingError::Closed),
    }
}

/// Reader task - forwards relay messages as events
///
/// Runs a plain loop without `select!` so reads are never cancelled.
async fn reader_task<R>(
    mut reader: R,
    events: mpsc::UnboundedSender<SignalingEvent>,
    stop_flag: Arc<AtomicBool>,
) where
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        if stop_flag.load(Ordering::Relaxed) {
            break;
        }

        let event = match read_server_message(&mut reader).await {
            Ok(Some(ServerMessage::ReceiveSignal { signal })) => SignalingEvent::Signal(signal),
            Ok(Some(ServerMessage::PeerConnected { peer_id })) => {
                SignalingEvent::PeerConnected(peer_id)
            }
            Ok(Some(ServerMessage::PeerDisconnected { peer_id })) => {
                SignalingEvent::PeerDisconnected(peer_id)
            }
            Ok(Some(ServerMessage::Error { message })) => {
                warn!(error = %message, "relay reported an error");
                SignalingEvent::Error(message)
            }
            Ok(Some(ServerMessage::Registered { peer_id })) => {
                debug!(peer = %peer_id, "ignoring repeated registration");
                continue;
            }
            Ok(None) => break,
            // The whole frame was consumed; the connection is still usable
            Err(
                e @ (FrameError::TooLarge { .. }
                | FrameError::InvalidJson(_)
                | FrameError::UnknownMessageType(_)),
            ) => {
                warn!(error = %e, "skipping unreadable relay message");
                continue;
            }
            Err(e) => {
                debug!(error = %e, "relay read failed");
                break;
            }
        };

        if events.send(event).is_err() {
            break;
        }
    }

    stop_flag.store(true, Ordering::Relaxed);
    let _ = events.send(SignalingEvent::Closed);
}

/// Writer task - sends queued requests to the relay
///
/// `select!` is safe here because `recv()` is cancel-safe.
async fn writer_task<W>(
    mut writer: W,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    mut shutdown_rx: oneshot::Receiver<()>,
    stop_flag: Arc<AtomicBool>,
) where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        if stop_flag.load(Ordering::Relaxed) {
            break;
        }

        tokio::select! {
            msg = cmd_rx.recv() => {
                let Some(msg) = msg else { break };
                if send_client_message(&mut writer, &msg).await.is_err() {
                    break;
                }
            }
            // Fires on explicit shutdown and when the client is dropped
            _ = &mut shutdown_rx => break,
        }
    }

    stop_flag.store(true, Ordering::Relaxed);
    let _ = writer.close().await;
}
