//! Parley Common Library
//!
//! Shared types, wire formats, and utilities for the Parley signaling relay
//! and its peers.

mod error;
pub mod channel;
pub mod hash;
pub mod io;
pub mod limits;
pub mod protocol;
pub mod validators;

pub use error::FrameError;
pub use protocol::{ClientMessage, PeerId, ServerMessage, SignalEnvelope, SignalKind};

/// Default port for the Parley signaling relay
pub const DEFAULT_PORT: u16 = 7600;

/// Default size of one file chunk on the data channel (16 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Default upper bound on the size of a single transferred file (100 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Buffer size for SHA-256 hashing operations (1MB for fewer syscalls)
pub const HASH_BUFFER_SIZE: usize = 1024 * 1024;

/// MIME type used when a file's type cannot be determined
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";
