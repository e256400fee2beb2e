//! Chunked file transfer over an open data channel
//!
//! The sender slices a file into fixed-size base64 chunks bracketed by
//! `file-start` and `file-end`. The receiver reassembles them by index and
//! verifies count, size and (when announced) the SHA-256 before handing the
//! file out.

mod file;
pub mod receiver;
pub mod sender;
mod types;

pub use file::OutgoingFile;
pub use receiver::TransferReceiver;
pub use sender::{TransferPlan, send_file};
pub use types::{ReceivedFile, TransferDirection, TransferError};


#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use parley_common::channel::ChannelMessage;

    use super::testing::RecordingTransport;
    use super::*;
    use crate::config::TransferOptions;

    const C: usize = 16;

    /// Send `data` through the sender and feed every frame to a receiver
    async fn round_trip(data: Vec<u8>, reorder: bool) -> Vec<u8> {
        let options = TransferOptions {
            chunk_size: C,
            ..Default::default()
        };
        let transport = RecordingTransport::new();
        let file = OutgoingFile::from_bytes("data.bin", "", data);
        send_file(&transport, &file, &options, &AtomicBool::new(false), |_| {})
            .await
            .unwrap();

        let mut frames = transport.frames();
        if reorder {
            let last = frames.len() - 1;
            frames[1..last].reverse();
        }

        let mut receiver = TransferReceiver::new(&options);
        for frame in frames {
            match frame {
                ChannelMessage::FileStart { metadata } => receiver.on_file_start(metadata).unwrap(),
                ChannelMessage::FileChunk { chunk } => {
                    receiver.on_file_chunk(&chunk).unwrap();
                }
                ChannelMessage::FileEnd => return receiver.on_file_end().unwrap().data,
                ChannelMessage::Message { .. } => panic!("unexpected chat frame"),
            }
        }
        panic!("no file-end");
    }

    #[tokio::test]
    async fn test_round_trip_at_chunk_boundaries() {
        for size in [0, 1, C - 1, C, C + 1, 10 * C, 10 * C + 7] {
            let data: Vec<u8> = (0..size).map(|i| (i * 31 % 251) as u8).collect();
            assert_eq!(round_trip(data.clone(), false).await, data, "size {size}");
        }
    }

    #[tokio::test]
    async fn test_reverse_delivery_reassembles() {
        let data: Vec<u8> = (0..10 * C + 7).map(|i| (i % 256) as u8).collect();
        assert_eq!(round_trip(data.clone(), true).await, data);
    }
}
