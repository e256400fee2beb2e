//! Native transport boundary
//!
//! The point-to-point channel itself (ICE, DTLS, SCTP in a real deployment)
//! lives outside this crate. The negotiation engine only drives it through
//! [`NativeTransport`] and hears back through a [`NativeEventSink`].

pub mod loopback;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use parley_common::PeerId;

pub use loopback::{LoopbackNetwork, LoopbackOp};

/// Failure reported by a native transport call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NativeError {
    #[error("failed to create offer: {0}")]
    CreateOffer(String),
    #[error("failed to create answer: {0}")]
    CreateAnswer(String),
    #[error("failed to apply remote answer: {0}")]
    ApplyAnswer(String),
    #[error("failed to add remote candidate: {0}")]
    AddCandidate(String),
    #[error("failed to set up transport: {0}")]
    Setup(String),
}

/// Asynchronous notification from a native transport
#[derive(Debug, Clone, PartialEq)]
pub enum NativeEvent {
    /// A local ICE candidate that must reach the remote peer
    CandidateDiscovered(Value),
    ChannelOpen,
    ChannelClose,
    /// One frame received on the open channel
    Message(Vec<u8>),
}

/// Where a transport delivers its events
///
/// Each sink is bound to one negotiation session. Events emitted after that
/// session is torn down are discarded by the engine.
#[derive(Clone)]
pub struct NativeEventSink {
    emit: Arc<dyn Fn(NativeEvent) -> bool + Send + Sync>,
}

impl NativeEventSink {
    pub fn new(emit: impl Fn(NativeEvent) -> bool + Send + Sync + 'static) -> Self {
        Self {
            emit: Arc::new(emit),
        }
    }

    /// Deliver an event, returning false if nobody is listening anymore
    pub fn emit(&self, event: NativeEvent) -> bool {
        (self.emit)(event)
    }
}

impl fmt::Debug for NativeEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeEventSink").finish_non_exhaustive()
    }
}

/// One point-to-point channel to a single remote peer
///
/// Offer, answer and candidate payloads are opaque JSON; the engine only
/// carries them through the relay.
#[async_trait]
pub trait NativeTransport: Send + Sync {
    async fn create_local_offer(&self) -> Result<Value, NativeError>;

    async fn create_local_answer(&self, offer: Value) -> Result<Value, NativeError>;

    async fn apply_remote_answer(&self, answer: Value) -> Result<(), NativeError>;

    async fn add_remote_candidate(&self, candidate: Value) -> Result<(), NativeError>;

    /// Send one frame, returning false if the channel refused it
    async fn send(&self, data: &[u8]) -> bool;

    async fn close(&self);
}

/// Creates a fresh transport for every negotiation session
pub trait NativeTransportFactory: Send + Sync {
    fn create(
        &self,
        remote: &PeerId,
        is_initiator: bool,
        events: NativeEventSink,
    ) -> Result<Arc<dyn NativeTransport>, NativeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_sink_forwards_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink = NativeEventSink::new(move |event| {
            sink_seen.lock().unwrap().push(event);
            true
        });

        assert!(sink.clone().emit(NativeEvent::ChannelOpen));
        assert!(sink.emit(NativeEvent::Message(b"hi".to_vec())));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![NativeEvent::ChannelOpen, NativeEvent::Message(b"hi".to_vec())]
        );
    }

    #[test]
    fn test_error_display() {
        let err = NativeError::CreateOffer("no route".into());
        assert_eq!(err.to_string(), "failed to create offer: no route");
    }
}
