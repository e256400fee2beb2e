//! Server-wide message constants

// =============================================================================
// Log messages
// =============================================================================

pub const MSG_BANNER: &str = "Parley relay v";
pub const MSG_LISTENING: &str = "Listening for signaling connections";
pub const MSG_SHUTDOWN_RECEIVED: &str = "Shutdown signal received, closing relay";

pub const ERR_ACCEPT: &str = "Failed to accept connection";
pub const ERR_BIND: &str = "Failed to bind listener";
pub const ERR_CONNECTION: &str = "Connection error";
pub const ERR_CONNECTION_LIMIT: &str = "Connection limit reached, dropping connection";
pub const ERR_PARSE_MESSAGE: &str = "Failed to read client message";
pub const ERR_SIGNAL_SIGINT: &str = "Failed to install SIGINT handler";
pub const ERR_SIGNAL_SIGTERM: &str = "Failed to install SIGTERM handler";
pub const ERR_SIGNAL_CTRLC: &str = "Failed to install Ctrl+C handler";

// =============================================================================
// Messages sent to clients before disconnecting
// =============================================================================

pub const ERR_INVALID_MESSAGE_FORMAT: &str = "Invalid message format";
pub const ERR_MESSAGE_TOO_LARGE: &str = "Message too large";
pub const ERR_REGISTER_TIMEOUT: &str = "Timed out waiting for registration";
pub const ERR_WS_HANDSHAKE: &str = "WebSocket handshake failed: ";
