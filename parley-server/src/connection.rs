//! Client connection handling

use std::io;
use std::net::SocketAddr;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, warn};

use parley_common::io::{DEFAULT_IDLE_TIMEOUT, read_client_message, send_server_message};
use parley_common::{ClientMessage, FrameError, ServerMessage};

use crate::constants::*;
use crate::registry::SessionId;
use crate::relay::SignalingRelay;

/// Parameters for handling a connection
pub struct ConnectionParams {
    pub peer_addr: SocketAddr,
    pub relay: SignalingRelay,
}

/// Drive one WebSocket connection until it closes
///
/// Reads client requests and writes queued relay messages concurrently. The
/// session is detached from the relay however the loop ends.
pub async fn handle_connection_inner<S>(socket: S, params: ConnectionParams) -> io::Result<()>
where
    S: Stream<Item = Result<Message, tungstenite::Error>>
        + Sink<Message, Error = tungstenite::Error>
        + Unpin,
{
    let ConnectionParams { peer_addr, relay } = params;

    let (mut writer, mut reader) = socket.split();

    // Everything the relay wants to send this client goes through here
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let session_id = relay.attach(tx).await;

    let result = loop {
        tokio::select! {
            result = read_client_message(&mut reader, Some(DEFAULT_IDLE_TIMEOUT)) => {
                match result {
                    Ok(Some(msg)) => handle_client_message(msg, session_id, &relay).await,
                    Ok(None) => break Ok(()),
                    Err(e) => {
                        // Only connections holding an identity may stay silent;
                        // one whose identity moved elsewhere is unregistered again
                        if e == FrameError::IdleTimeout
                            && relay.registry().lookup_identity(session_id).await.is_some()
                        {
                            continue;
                        }

                        log_frame_error(&e, peer_addr);

                        // Try to tell the client why before disconnecting
                        let error_msg = ServerMessage::Error {
                            message: client_error_text(&e).to_string(),
                        };
                        let _ = send_server_message(&mut writer, &error_msg).await;
                        break Err(e.into());
                    }
                }
            }

            msg = rx.recv() => {
                match msg {
                    Some(msg) => {
                        if let Err(e) = send_server_message(&mut writer, &msg).await {
                            break Err(e.into());
                        }
                    }
                    // Session was detached from the relay
                    None => break Ok(()),
                }
            }
        }
    };

    let _ = writer.close().await;
    relay.on_disconnect(session_id).await;
    debug!(session = session_id, %peer_addr, "connection closed");

    result
}

/// Handle a message from the client
async fn handle_client_message(msg: ClientMessage, session_id: SessionId, relay: &SignalingRelay) {
    match msg {
        ClientMessage::Register { existing_id } => {
            relay.on_register(session_id, existing_id).await;
        }
        ClientMessage::RelaySignal { target_id, signal } => {
            relay.on_relay_signal(session_id, &target_id, signal).await;
        }
    }
}

/// Timeouts and closed sockets are routine; only log them in debug
fn log_frame_error(error: &FrameError, peer_addr: SocketAddr) {
    match error {
        FrameError::IdleTimeout | FrameError::ConnectionClosed => {
            debug!(%peer_addr, error = %error, "{ERR_PARSE_MESSAGE}");
        }
        _ => warn!(%peer_addr, error = %error, "{ERR_PARSE_MESSAGE}"),
    }
}

fn client_error_text(error: &FrameError) -> &'static str {
    match error {
        FrameError::IdleTimeout => ERR_REGISTER_TIMEOUT,
        FrameError::TooLarge { .. } => ERR_MESSAGE_TOO_LARGE,
        _ => ERR_INVALID_MESSAGE_FORMAT,
    }
}
