//! Transfer types shared by the sender and receiver

use std::io;
use std::path::{Path, PathBuf};

use parley_common::channel::FileMetadata;

// =============================================================================
// Transfer Direction
// =============================================================================

/// Which side of a transfer this client is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferDirection {
    Send,
    Receive,
}

// =============================================================================
// Transfer Error
// =============================================================================

/// Why a transfer did not complete
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// File exceeds the configured maximum; nothing was sent
    #[error("file is {size} bytes, limit is {max}")]
    TooLarge { size: u64, max: u64 },

    /// `file-end` arrived before every chunk did
    #[error("missing chunks: received {received} of {expected}")]
    MissingChunks { received: u32, expected: u32 },

    /// Reassembled length differs from the announced size
    #[error("reassembled {actual} bytes, expected {expected}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// Reassembled content does not match the announced SHA-256
    #[error("SHA-256 mismatch")]
    HashMismatch,

    /// The native channel refused a frame
    #[error("channel refused to send")]
    ChannelSend,

    /// The session closed while the transfer was running
    #[error("transfer cancelled")]
    Cancelled,

    /// Another outbound transfer to the same peer is still running
    #[error("a transfer to this peer is already in progress")]
    Busy,

    /// The file name cannot be carried safely
    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    /// The peer sent something that breaks the transfer protocol
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(String),

    /// No open channel to the peer
    #[error("not connected")]
    NotConnected,
}

impl From<io::Error> for TransferError {
    fn from(err: io::Error) -> Self {
        TransferError::Io(err.to_string())
    }
}

// =============================================================================
// Received File
// =============================================================================

/// A fully reassembled and verified inbound file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub metadata: FileMetadata,
    pub data: Vec<u8>,
}

impl ReceivedFile {
    /// Write the file into `dir` under its announced name
    ///
    /// The name was validated when the transfer started, so it cannot
    /// escape `dir`. An existing file is not overwritten.
    pub async fn save_in(&self, dir: &Path) -> io::Result<PathBuf> {
        use tokio::io::AsyncWriteExt;

        let path = dir.join(&self.metadata.name);
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(&self.data).await?;
        file.flush().await?;
        Ok(path)
    }
}

/// Progress percentage for `done` of `total` units, held below 100
///
/// Rounds half up. Only the terminating `file-end` may report 100.
pub(crate) fn progress_percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = (done.min(total) * 200 + total) / (2 * total);
    percent.min(99) as u8
}
