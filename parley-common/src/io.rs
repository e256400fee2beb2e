//! I/O utilities for sending and receiving relay messages
//!
//! This module is the interface between the protocol message types
//! (`ClientMessage`, `ServerMessage`) and WebSocket text frames. Helpers are
//! generic over any `Stream`/`Sink` of tungstenite messages, so the relay,
//! the client, and in-memory test sockets share one code path.

use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::FrameError;
use crate::limits::{MAX_FRAME_LENGTH, is_known_message_type, max_payload_for_type};
use crate::protocol::{ClientMessage, ServerMessage};

/// How long a fresh connection may stay silent before it must register
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Message Sending
// =============================================================================

/// Send a `ClientMessage` to the relay
pub async fn send_client_message<W>(writer: &mut W, message: &ClientMessage) -> Result<(), FrameError>
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    send_json(writer, message).await
}

/// Send a `ServerMessage` to a client
pub async fn send_server_message<W>(writer: &mut W, message: &ServerMessage) -> Result<(), FrameError>
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    send_json(writer, message).await
}

async fn send_json<W, T>(writer: &mut W, message: &T) -> Result<(), FrameError>
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
    T: serde::Serialize,
{
    let text =
        serde_json::to_string(message).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
    writer.send(Message::Text(text.into())).await.map_err(Into::into)
}

/// Check a `ServerMessage` against its type's limit before queueing it
///
/// The relay rewrites what clients send, so a request that was within its
/// own limit can still turn into a message receivers would reject.
pub fn check_server_message_size(message: &ServerMessage) -> Result<(), FrameError> {
    let size = serde_json::to_vec(message)
        .map_err(|e| FrameError::InvalidJson(e.to_string()))?
        .len();
    let max = max_payload_for_type(message.type_name()).unwrap_or(0) as usize;
    if size > max {
        return Err(FrameError::TooLarge { size, max });
    }
    Ok(())
}

// =============================================================================
// Message Receiving
// =============================================================================

/// Read a `ClientMessage` from the stream
///
/// With `idle_timeout` set, fails with [`FrameError::IdleTimeout`] if no
/// message arrives in time. Returns `Ok(None)` if the connection was cleanly
/// closed.
pub async fn read_client_message<R>(
    reader: &mut R,
    idle_timeout: Option<Duration>,
) -> Result<Option<ClientMessage>, FrameError>
where
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let Some(text) = next_text_frame(reader, idle_timeout).await? else {
        return Ok(None);
    };

    parse_message(&text).map(Some)
}

/// Read a `ServerMessage` from the stream
///
/// Returns `Ok(None)` if the connection was cleanly closed.
pub async fn read_server_message<R>(reader: &mut R) -> Result<Option<ServerMessage>, FrameError>
where
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let Some(text) = next_text_frame(reader, None).await? else {
        return Ok(None);
    };

    parse_message(&text).map(Some)
}

/// Wait for the next text frame, skipping control and binary frames
async fn next_text_frame<R>(
    reader: &mut R,
    idle_timeout: Option<Duration>,
) -> Result<Option<String>, FrameError>
where
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        let next = match idle_timeout {
            Some(timeout) => tokio::time::timeout(timeout, reader.next())
                .await
                .map_err(|_| FrameError::IdleTimeout)?,
            None => reader.next().await,
        };

        match next {
            None | Some(Ok(Message::Close(_))) => return Ok(None),
            Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().to_owned())),
            Some(Ok(_)) => continue,
            Some(Err(e)) => match FrameError::from(e) {
                FrameError::ConnectionClosed => return Ok(None),
                other => return Err(other),
            },
        }
    }
}

/// Just the `type` tag of a message
#[derive(Deserialize)]
struct TypeTag {
    #[serde(rename = "type")]
    message_type: String,
}

/// Check size limits, then parse a full message
///
/// The global frame limit is checked before any parsing; the per-type limit
/// once the tag is known.
fn parse_message<T: DeserializeOwned>(text: &str) -> Result<T, FrameError> {
    if text.len() > MAX_FRAME_LENGTH {
        return Err(FrameError::TooLarge {
            size: text.len(),
            max: MAX_FRAME_LENGTH,
        });
    }

    let tag: TypeTag =
        serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
    if !is_known_message_type(&tag.message_type) {
        return Err(FrameError::UnknownMessageType(tag.message_type));
    }

    let max = max_payload_for_type(&tag.message_type).unwrap_or(0) as usize;
    if text.len() > max {
        return Err(FrameError::TooLarge {
            size: text.len(),
            max,
        });
    }

    serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))
}
