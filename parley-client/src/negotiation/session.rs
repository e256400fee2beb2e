//! Per-peer negotiation session

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::native::NativeTransport;

use super::Role;

/// Live native channel to one remote peer
pub(super) struct NegotiationSession {
    pub(super) role: Role,
    /// Distinguishes this session's native events from a predecessor's
    pub(super) generation: u64,
    pub(super) transport: Arc<dyn NativeTransport>,
    pub(super) remote_answer_applied: bool,
    pub(super) connected: bool,
    cancel: Arc<AtomicBool>,
    sending: Arc<AtomicBool>,
}

impl NegotiationSession {
    pub(super) fn new(role: Role, generation: u64, transport: Arc<dyn NativeTransport>) -> Self {
        Self {
            role,
            generation,
            transport,
            remote_answer_applied: false,
            connected: false,
            cancel: Arc::new(AtomicBool::new(false)),
            sending: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(super) fn channel(&self) -> ChannelHandle {
        ChannelHandle {
            transport: self.transport.clone(),
            cancel: self.cancel.clone(),
            sending: self.sending.clone(),
        }
    }

    /// Abort any in-flight send and close the native channel
    pub(super) async fn teardown(self) {
        self.cancel.store(true, Ordering::Relaxed);
        self.transport.close().await;
    }
}

/// Access to an open channel from outside the peer's worker
///
/// Outbound transfers run on the caller's task so the worker stays free to
/// react to a channel close, which trips `cancel`.
#[derive(Clone)]
pub(super) struct ChannelHandle {
    pub(super) transport: Arc<dyn NativeTransport>,
    pub(super) cancel: Arc<AtomicBool>,
    sending: Arc<AtomicBool>,
}

impl ChannelHandle {
    /// Claim the single outbound transfer slot
    pub(super) fn begin_send(&self) -> Option<SendGuard> {
        self.sending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SendGuard {
                flag: self.sending.clone(),
            })
    }
}

/// Releases the outbound transfer slot when dropped
pub(super) struct SendGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for SendGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::testing::RecordingTransport;

    #[test]
    fn test_single_send_slot() {
        let session = NegotiationSession::new(Role::Initiator, 1, Arc::new(RecordingTransport::new()));
        let channel = session.channel();

        let guard = channel.begin_send().expect("slot free");
        assert!(channel.begin_send().is_none());
        assert!(session.channel().begin_send().is_none());

        drop(guard);
        assert!(channel.begin_send().is_some());
    }

    #[tokio::test]
    async fn test_teardown_trips_cancel() {
        let session = NegotiationSession::new(Role::Responder, 1, Arc::new(RecordingTransport::new()));
        let channel = session.channel();
        assert!(!channel.cancel.load(Ordering::Relaxed));

        session.teardown().await;
        assert!(channel.cancel.load(Ordering::Relaxed));
    }
}
