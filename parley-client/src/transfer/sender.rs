//! Outbound side of the chunked transfer engine

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};

use parley_common::channel::{ChannelMessage, FileChunk, FileMetadata};
use parley_common::validators::validate_file_name;

use super::types::progress_percent;
use super::{OutgoingFile, TransferError};
use crate::config::TransferOptions;
use crate::native::NativeTransport;

/// What will be announced and how the file will be cut
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub metadata: FileMetadata,
    pub chunk_size: usize,
    pub total_chunks: u32,
}

/// `ceil(size / chunk_size)`, or `None` if it does not fit the wire format
pub(crate) fn total_chunks(size: u64, chunk_size: usize) -> Option<u32> {
    let chunk_size = u64::try_from(chunk_size.max(1)).ok()?;
    u32::try_from(size.div_ceil(chunk_size)).ok()
}

/// Check a file against the limits and decide how to chunk it
///
/// Nothing touches the channel here, so a rejected file costs no sends.
pub fn plan(file: &OutgoingFile, options: &TransferOptions) -> Result<TransferPlan, TransferError> {
    let too_large = TransferError::TooLarge {
        size: file.size(),
        max: options.max_file_size,
    };
    if file.size() > options.max_file_size {
        return Err(too_large);
    }

    validate_file_name(file.name())
        .map_err(|e| TransferError::InvalidFileName(format!("{}: {e:?}", file.name())))?;

    let chunk_size = options.chunk_size.max(1);
    let total_chunks = total_chunks(file.size(), chunk_size).ok_or(too_large)?;

    Ok(TransferPlan {
        metadata: file.metadata(options.include_hash),
        chunk_size,
        total_chunks,
    })
}

/// Stream a planned file: `file-start`, every chunk in order, then `file-end`
///
/// `on_progress` sees strictly increasing percentages; 100 is reported only
/// once `file-end` has been sent. The cancel flag is checked before every
/// chunk.
pub async fn run<F>(
    transport: &dyn NativeTransport,
    file: &OutgoingFile,
    plan: &TransferPlan,
    chunk_delay: Option<Duration>,
    cancel: &AtomicBool,
    mut on_progress: F,
) -> Result<(), TransferError>
where
    F: FnMut(u8),
{
    send_frame(
        transport,
        &ChannelMessage::FileStart {
            metadata: plan.metadata.clone(),
        },
    )
    .await?;

    let mut reader = file.reader().await?;
    let mut buffer = vec![0u8; plan.chunk_size];
    let mut remaining = file.size();
    let mut last_percent = 0;

    for index in 0..plan.total_chunks {
        if cancel.load(Ordering::Relaxed) {
            return Err(TransferError::Cancelled);
        }

        let want = buffer.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let read = read_full(&mut reader, &mut buffer[..want]).await?;
        if read < want {
            return Err(TransferError::Io("file shrank during transfer".to_string()));
        }
        remaining -= read as u64;

        let chunk = FileChunk::encode(index, plan.total_chunks, &buffer[..read]);
        send_frame(transport, &ChannelMessage::FileChunk { chunk }).await?;

        let percent = progress_percent(u64::from(index) + 1, u64::from(plan.total_chunks));
        if percent > last_percent {
            last_percent = percent;
            on_progress(percent);
        }

        if let Some(delay) = chunk_delay
            && index + 1 < plan.total_chunks
        {
            tokio::time::sleep(delay).await;
        }
    }

    if cancel.load(Ordering::Relaxed) {
        return Err(TransferError::Cancelled);
    }
    send_frame(transport, &ChannelMessage::FileEnd).await?;
    on_progress(100);
    Ok(())
}

/// Plan and run in one step
pub async fn send_file<F>(
    transport: &dyn NativeTransport,
    file: &OutgoingFile,
    options: &TransferOptions,
    cancel: &AtomicBool,
    on_progress: F,
) -> Result<(), TransferError>
where
    F: FnMut(u8),
{
    let plan = plan(file, options)?;
    run(transport, file, &plan, options.chunk_delay(), cancel, on_progress).await
}

/// Serialize one control message and push it through the channel
pub(crate) async fn send_frame(
    transport: &dyn NativeTransport,
    message: &ChannelMessage,
) -> Result<(), TransferError> {
    let text = message
        .to_text()
        .map_err(|e| TransferError::Protocol(e.to_string()))?;
    if transport.send(text.as_bytes()).await {
        Ok(())
    } else {
        Err(TransferError::ChannelSend)
    }
}

/// Fill `buf` unless the reader hits EOF first
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
