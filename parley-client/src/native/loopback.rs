//! In-memory native transport
//!
//! Every transport created from one [`LoopbackNetwork`] can reach every
//! other. Descriptions and candidates are small JSON objects naming the
//! endpoint that produced them. A channel opens on both ends once each side
//! has a remote description and has seen at least one remote candidate,
//! which mirrors the order a real ICE agent needs.
//!
//! Faults can be injected per operation, and `send` can be made to fail after
//! a fixed number of successes.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use parley_common::PeerId;

use super::{NativeError, NativeEvent, NativeEventSink, NativeTransport, NativeTransportFactory};

type EndpointId = u64;

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopbackOp {
    Create,
    CreateOffer,
    CreateAnswer,
    ApplyAnswer,
    AddCandidate,
}

impl LoopbackOp {
    fn error(self) -> NativeError {
        let reason = "injected failure".to_string();
        match self {
            LoopbackOp::Create => NativeError::Setup(reason),
            LoopbackOp::CreateOffer => NativeError::CreateOffer(reason),
            LoopbackOp::CreateAnswer => NativeError::CreateAnswer(reason),
            LoopbackOp::ApplyAnswer => NativeError::ApplyAnswer(reason),
            LoopbackOp::AddCandidate => NativeError::AddCandidate(reason),
        }
    }
}

struct Endpoint {
    events: NativeEventSink,
    remote: Option<EndpointId>,
    has_remote_description: bool,
    has_remote_candidate: bool,
    open: bool,
}

#[derive(Default)]
struct NetworkState {
    endpoints: HashMap<EndpointId, Endpoint>,
    next_endpoint: EndpointId,
    created: usize,
    failing_ops: HashSet<LoopbackOp>,
    /// Successful sends left before `send` starts failing
    send_budget: Option<usize>,
}

impl NetworkState {
    /// Open the channel between `id` and its remote if both ends are ready
    ///
    /// Returns the sinks that must be told the channel is open.
    fn try_open(&mut self, id: EndpointId) -> Vec<NativeEventSink> {
        let Some(me) = self.endpoints.get(&id) else {
            return Vec::new();
        };
        if me.open || !me.has_remote_description || !me.has_remote_candidate {
            return Vec::new();
        }
        let Some(remote_id) = me.remote else {
            return Vec::new();
        };
        let Some(remote) = self.endpoints.get(&remote_id) else {
            return Vec::new();
        };
        if remote.remote != Some(id) || !remote.has_remote_description || !remote.has_remote_candidate
        {
            return Vec::new();
        }

        let mut sinks = Vec::with_capacity(2);
        for endpoint_id in [id, remote_id] {
            if let Some(endpoint) = self.endpoints.get_mut(&endpoint_id) {
                endpoint.open = true;
                sinks.push(endpoint.events.clone());
            }
        }
        debug!(a = id, b = remote_id, "loopback channel open");
        sinks
    }
}

/// Shared in-memory "network" that loopback transports live on
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future call of `op` fail
    pub fn fail_operation(&self, op: LoopbackOp) {
        self.lock().failing_ops.insert(op);
    }

    /// Let `count` more sends succeed across the network, then fail the rest
    pub fn fail_send_after(&self, count: usize) {
        self.lock().send_budget = Some(count);
    }

    pub fn clear_faults(&self) {
        let mut state = self.lock();
        state.failing_ops.clear();
        state.send_budget = None;
    }

    /// Number of transports ever created on this network
    pub fn transports_created(&self) -> usize {
        self.lock().created
    }

    /// Number of transports not yet closed
    pub fn live_endpoints(&self) -> usize {
        self.lock().endpoints.len()
    }

    /// Number of endpoints whose channel is currently open
    pub fn open_endpoints(&self) -> usize {
        self.lock().endpoints.values().filter(|e| e.open).count()
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_fault(&self, op: LoopbackOp) -> Result<(), NativeError> {
        if self.lock().failing_ops.contains(&op) {
            return Err(op.error());
        }
        Ok(())
    }
}

impl NativeTransportFactory for LoopbackNetwork {
    fn create(
        &self,
        remote: &PeerId,
        is_initiator: bool,
        events: NativeEventSink,
    ) -> Result<Arc<dyn NativeTransport>, NativeError> {
        self.check_fault(LoopbackOp::Create)?;

        let mut state = self.lock();
        let id = state.next_endpoint;
        state.next_endpoint += 1;
        state.created += 1;
        state.endpoints.insert(
            id,
            Endpoint {
                events,
                remote: None,
                has_remote_description: false,
                has_remote_candidate: false,
                open: false,
            },
        );
        debug!(endpoint = id, peer = %remote, is_initiator, "loopback transport created");

        Ok(Arc::new(LoopbackTransport {
            network: self.clone(),
            id,
        }))
    }
}

/// One end of a loopback channel
struct LoopbackTransport {
    network: LoopbackNetwork,
    id: EndpointId,
}

impl LoopbackTransport {
    fn description(&self, kind: &str) -> Value {
        json!({ "type": kind, "endpoint": self.id })
    }

    /// Emit this endpoint's single ICE candidate
    fn announce_candidate(&self) {
        let sink = self
            .network
            .lock()
            .endpoints
            .get(&self.id)
            .map(|e| e.events.clone());
        if let Some(sink) = sink {
            sink.emit(NativeEvent::CandidateDiscovered(
                json!({ "candidate": format!("loopback {}", self.id), "endpoint": self.id }),
            ));
        }
    }

    /// Record a remote description and open the channel if possible
    fn set_remote(&self, remote: EndpointId) -> Vec<NativeEventSink> {
        let mut state = self.network.lock();
        match state.endpoints.get_mut(&self.id) {
            Some(me) => {
                me.remote = Some(remote);
                me.has_remote_description = true;
            }
            None => return Vec::new(),
        }
        let mut sinks = state.try_open(self.id);
        sinks.extend(state.try_open(remote));
        sinks
    }
}

fn endpoint_of(value: &Value) -> Option<EndpointId> {
    value.get("endpoint")?.as_u64()
}

fn notify_open(sinks: Vec<NativeEventSink>) {
    for sink in sinks {
        sink.emit(NativeEvent::ChannelOpen);
    }
}

#[async_trait]
impl NativeTransport for LoopbackTransport {
    async fn create_local_offer(&self) -> Result<Value, NativeError> {
        self.network.check_fault(LoopbackOp::CreateOffer)?;
        self.announce_candidate();
        Ok(self.description("offer"))
    }

    async fn create_local_answer(&self, offer: Value) -> Result<Value, NativeError> {
        self.network.check_fault(LoopbackOp::CreateAnswer)?;
        let remote = endpoint_of(&offer)
            .ok_or_else(|| NativeError::CreateAnswer("offer names no endpoint".into()))?;

        let sinks = self.set_remote(remote);
        self.announce_candidate();
        notify_open(sinks);
        Ok(self.description("answer"))
    }

    async fn apply_remote_answer(&self, answer: Value) -> Result<(), NativeError> {
        self.network.check_fault(LoopbackOp::ApplyAnswer)?;
        let remote = endpoint_of(&answer)
            .ok_or_else(|| NativeError::ApplyAnswer("answer names no endpoint".into()))?;

        notify_open(self.set_remote(remote));
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: Value) -> Result<(), NativeError> {
        self.network.check_fault(LoopbackOp::AddCandidate)?;
        if endpoint_of(&candidate).is_none() {
            return Err(NativeError::AddCandidate("malformed candidate".into()));
        }

        let sinks = {
            let mut state = self.network.lock();
            match state.endpoints.get_mut(&self.id) {
                Some(me) => me.has_remote_candidate = true,
                None => return Ok(()),
            }
            state.try_open(self.id)
        };
        notify_open(sinks);
        Ok(())
    }

    async fn send(&self, data: &[u8]) -> bool {
        let sink = {
            let mut state = self.network.lock();
            let Some(remote_id) = state
                .endpoints
                .get(&self.id)
                .filter(|me| me.open)
                .and_then(|me| me.remote)
            else {
                return false;
            };
            let Some(remote) = state.endpoints.get(&remote_id).filter(|r| r.open) else {
                return false;
            };
            let sink = remote.events.clone();

            match state.send_budget.as_mut() {
                Some(0) => return false,
                Some(budget) => *budget -= 1,
                None => {}
            }
            sink
        };

        sink.emit(NativeEvent::Message(data.to_vec()));
        true
    }

    async fn close(&self) {
        let sink = {
            let mut state = self.network.lock();
            let Some(me) = state.endpoints.remove(&self.id) else {
                return;
            };
            match me.remote.and_then(|id| state.endpoints.get_mut(&id)) {
                Some(remote) if remote.open => {
                    remote.open = false;
                    Some(remote.events.clone())
                }
                _ => None,
            }
        };

        if let Some(sink) = sink {
            sink.emit(NativeEvent::ChannelClose);
        }
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.network.lock().endpoints.remove(&self.id);
    }
}
