//! Inbound side of the chunked transfer engine
//!
//! Chunks land in index-addressed slots, so arrival order does not matter
//! and a repeated index is counted once. Any protocol violation discards the
//! partial file; nothing is exposed until `file-end` validates.

use tracing::debug;

use parley_common::channel::{FileChunk, FileMetadata};
use parley_common::hash::sha256_hex;
use parley_common::validators::{validate_file_name, validate_sha256};

use super::sender::total_chunks;
use super::types::progress_percent;
use super::{ReceivedFile, TransferError};
use crate::config::TransferOptions;

/// Bookkeeping for the one in-flight inbound file
struct IncomingTransfer {
    metadata: FileMetadata,
    slots: Vec<Option<Vec<u8>>>,
    received: u32,
    progress: u8,
}

impl IncomingTransfer {
    fn expected(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Store one chunk, returning the new progress if it moved
    fn accept(&mut self, chunk: &FileChunk, chunk_size: usize) -> Result<Option<u8>, TransferError> {
        let expected = self.expected();
        if chunk.total != expected {
            return Err(TransferError::Protocol(format!(
                "chunk claims {} total, expected {expected}",
                chunk.total
            )));
        }
        if chunk.index >= expected {
            return Err(TransferError::Protocol(format!(
                "chunk index {} out of range 0..{expected}",
                chunk.index
            )));
        }

        let bytes = chunk
            .decode()
            .map_err(|e| TransferError::Protocol(format!("invalid chunk data: {e}")))?;
        if bytes.len() > chunk_size {
            return Err(TransferError::Protocol(format!(
                "chunk of {} bytes exceeds chunk size {chunk_size}",
                bytes.len()
            )));
        }

        let slot = &mut self.slots[chunk.index as usize];
        if slot.is_none() {
            self.received += 1;
        }
        *slot = Some(bytes);

        let percent = progress_percent(u64::from(self.received), u64::from(expected));
        if percent > self.progress {
            self.progress = percent;
            return Ok(Some(percent));
        }
        Ok(None)
    }

    /// Reassemble and verify the complete file
    fn finish(self) -> Result<ReceivedFile, TransferError> {
        let expected = self.expected();
        if self.received != expected {
            return Err(TransferError::MissingChunks {
                received: self.received,
                expected,
            });
        }

        let mut data = Vec::with_capacity(usize::try_from(self.metadata.size).unwrap_or(0));
        for bytes in self.slots.into_iter().flatten() {
            data.extend_from_slice(&bytes);
        }

        if data.len() as u64 != self.metadata.size {
            return Err(TransferError::SizeMismatch {
                expected: self.metadata.size,
                actual: data.len() as u64,
            });
        }
        if let Some(hash) = &self.metadata.sha256
            && sha256_hex(&data) != *hash
        {
            return Err(TransferError::HashMismatch);
        }

        Ok(ReceivedFile {
            metadata: self.metadata,
            data,
        })
    }
}

/// Receives files from one peer, one at a time
pub struct TransferReceiver {
    chunk_size: usize,
    max_file_size: u64,
    current: Option<IncomingTransfer>,
}

impl TransferReceiver {
    pub fn new(options: &TransferOptions) -> Self {
        Self {
            chunk_size: options.chunk_size.max(1),
            max_file_size: options.max_file_size,
            current: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Metadata of the transfer in progress
    pub fn metadata(&self) -> Option<&FileMetadata> {
        self.current.as_ref().map(|t| &t.metadata)
    }

    /// Begin a new inbound file, discarding any unfinished one
    pub fn on_file_start(&mut self, metadata: FileMetadata) -> Result<(), TransferError> {
        if let Some(previous) = self.current.take() {
            debug!(name = %previous.metadata.name, "discarding unfinished inbound transfer");
        }

        validate_file_name(&metadata.name)
            .map_err(|e| TransferError::InvalidFileName(format!("{}: {e:?}", metadata.name)))?;
        if let Some(hash) = &metadata.sha256 {
            validate_sha256(hash)
                .map_err(|e| TransferError::Protocol(format!("invalid sha256: {e:?}")))?;
        }
        if metadata.size > self.max_file_size {
            return Err(TransferError::TooLarge {
                size: metadata.size,
                max: self.max_file_size,
            });
        }
        let expected = total_chunks(metadata.size, self.chunk_size).ok_or(
            TransferError::TooLarge {
                size: metadata.size,
                max: self.max_file_size,
            },
        )?;

        self.current = Some(IncomingTransfer {
            metadata,
            slots: vec![None; expected as usize],
            received: 0,
            progress: 0,
        });
        Ok(())
    }

    /// Store a chunk, returning the new progress percentage if it changed
    pub fn on_file_chunk(&mut self, chunk: &FileChunk) -> Result<Option<u8>, TransferError> {
        let transfer = self
            .current
            .as_mut()
            .ok_or_else(|| TransferError::Protocol("file-chunk without file-start".to_string()))?;

        let result = transfer.accept(chunk, self.chunk_size);
        if result.is_err() {
            self.current = None;
        }
        result
    }

    /// Finish the current file; the state is consumed either way
    pub fn on_file_end(&mut self) -> Result<ReceivedFile, TransferError> {
        self.current
            .take()
            .ok_or_else(|| TransferError::Protocol("file-end without file-start".to_string()))?
            .finish()
    }

    /// Drop the unfinished file, returning its metadata if there was one
    pub fn abort(&mut self) -> Option<FileMetadata> {
        self.current.take().map(|t| t.metadata)
    }
}
