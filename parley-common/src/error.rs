//! Errors raised while reading or writing relay messages

use std::io;

use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::error::CapacityError;

/// Failure reading or writing a relay message over a WebSocket
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The peer closed the connection
    #[error("connection closed")]
    ConnectionClosed,
    /// No message arrived within the idle timeout
    #[error("idle timeout")]
    IdleTimeout,
    /// The message exceeds the limit for its type
    #[error("message too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },
    /// The `type` tag names no known message
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),
    /// The message is not valid JSON for its type
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    /// The underlying WebSocket failed
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<tungstenite::Error> for FrameError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                FrameError::ConnectionClosed
            }
            tungstenite::Error::Capacity(CapacityError::MessageTooLong { size, max_size }) => {
                FrameError::TooLarge {
                    size,
                    max: max_size,
                }
            }
            other => FrameError::Transport(other.to_string()),
        }
    }
}

impl From<FrameError> for io::Error {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::ConnectionClosed => {
                io::Error::new(io::ErrorKind::ConnectionReset, "connection closed")
            }
            FrameError::IdleTimeout => io::Error::new(io::ErrorKind::TimedOut, "idle timeout"),
            FrameError::TooLarge { .. }
            | FrameError::UnknownMessageType(_)
            | FrameError::InvalidJson(_) => {
                io::Error::new(io::ErrorKind::InvalidData, err.to_string())
            }
            FrameError::Transport(msg) => io::Error::other(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_websocket_maps_to_connection_closed() {
        let err: FrameError = tungstenite::Error::ConnectionClosed.into();
        assert_eq!(err, FrameError::ConnectionClosed);

        let err: FrameError = tungstenite::Error::AlreadyClosed.into();
        assert_eq!(err, FrameError::ConnectionClosed);
    }

    #[test]
    fn test_capacity_error_maps_to_too_large() {
        let err: FrameError = tungstenite::Error::Capacity(CapacityError::MessageTooLong {
            size: 10,
            max_size: 5,
        })
        .into();
        assert_eq!(err, FrameError::TooLarge { size: 10, max: 5 });
    }

    #[test]
    fn test_io_error_kinds() {
        let io_err: io::Error = FrameError::ConnectionClosed.into();
        assert_eq!(io_err.kind(), io::ErrorKind::ConnectionReset);

        let io_err: io::Error = FrameError::IdleTimeout.into();
        assert_eq!(io_err.kind(), io::ErrorKind::TimedOut);

        let io_err: io::Error = FrameError::InvalidJson("bad".into()).into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);
    }
}
