//! WebSocket accept for signaling connections
//!
//! Performs the WebSocket handshake on a raw TCP stream and hands the
//! resulting message stream to the connection handler.

use std::io;

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

use parley_common::limits::MAX_FRAME_LENGTH;

use crate::connection::{ConnectionParams, handle_connection_inner};
use crate::constants::ERR_WS_HANDSHAKE;

/// Maximum size of a single WebSocket message
///
/// Matches the largest relay frame so oversized messages are refused by the
/// WebSocket layer before they are buffered whole.
pub const MAX_WS_MESSAGE_SIZE: usize = MAX_FRAME_LENGTH;

/// WebSocket settings used for every accepted connection
pub fn websocket_config() -> WebSocketConfig {
    WebSocketConfig::default()
        .max_message_size(Some(MAX_WS_MESSAGE_SIZE))
        .max_frame_size(Some(MAX_WS_MESSAGE_SIZE))
}

/// Handle a WebSocket signaling connection
///
/// Performs the WebSocket handshake, then delegates to the standard
/// connection handler.
pub async fn handle_websocket_connection(
    socket: TcpStream,
    params: ConnectionParams,
) -> io::Result<()> {
    let ws_stream = tokio_tungstenite::accept_async_with_config(socket, Some(websocket_config()))
        .await
        .map_err(|e| io::Error::other(format!("{ERR_WS_HANDSHAKE}{e}")))?;

    handle_connection_inner(ws_stream, params).await
}
