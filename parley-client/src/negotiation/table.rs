//! Peer slots shared by the manager and its workers
//!
//! A slot holds the peer's state channel and, while a worker is running, the
//! worker's queue. The state channel outlives any one worker so a subscriber
//! keeps seeing later sessions with the same peer.
//!
//! Every send into a worker queue happens under the table lock, and a worker
//! only retires under that lock after finding its queue empty. A reaction is
//! therefore either seen by the worker or routed to a fresh one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, watch};

use parley_common::PeerId;

use super::worker::Reaction;
use super::{ChannelState, NegotiationError};

struct PeerSlot {
    state: Arc<watch::Sender<ChannelState>>,
    /// `None` while no worker is running for the peer
    queue: Option<mpsc::UnboundedSender<Reaction>>,
}

impl PeerSlot {
    fn new() -> Self {
        let (state, _) = watch::channel(ChannelState::Idle);
        Self {
            state: Arc::new(state),
            queue: None,
        }
    }

    fn is_unused(&self) -> bool {
        self.queue.is_none() && self.state.receiver_count() == 0
    }
}

#[derive(Default)]
struct Slots {
    peers: HashMap<PeerId, PeerSlot>,
    closed: bool,
}

impl Slots {
    fn prune(&mut self) {
        self.peers.retain(|_, slot| !slot.is_unused());
    }
}

#[derive(Default)]
pub(super) struct PeerTable {
    slots: Mutex<Slots>,
}

impl PeerTable {
    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue `reaction` for the running worker of `peer`; false if there is none
    pub(super) fn send(&self, peer: &PeerId, reaction: Reaction) -> bool {
        self.lock()
            .peers
            .get(peer)
            .and_then(|slot| slot.queue.as_ref())
            .is_some_and(|queue| queue.send(reaction).is_ok())
    }

    /// Queue `reaction` for `peer`, starting a worker with `spawn` if none runs
    pub(super) fn send_or_spawn(
        &self,
        peer: &PeerId,
        reaction: Reaction,
        spawn: impl FnOnce(Arc<watch::Sender<ChannelState>>) -> mpsc::UnboundedSender<Reaction>,
    ) -> Result<(), NegotiationError> {
        let mut slots = self.lock();
        if slots.closed {
            return Err(NegotiationError::Shutdown);
        }

        let slot = slots.peers.entry(peer.clone()).or_insert_with(PeerSlot::new);
        let reaction = match &slot.queue {
            Some(queue) => match queue.send(reaction) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(reaction)) => reaction,
            },
            None => reaction,
        };

        let queue = spawn(slot.state.clone());
        queue
            .send(reaction)
            .map_err(|_| NegotiationError::Shutdown)?;
        slot.queue = Some(queue);
        Ok(())
    }

    /// Detach the worker owning `own` if `pending` is empty
    ///
    /// Returns whether the worker is detached and should stop.
    pub(super) fn retire(
        &self,
        peer: &PeerId,
        own: &mpsc::UnboundedSender<Reaction>,
        pending: &mpsc::UnboundedReceiver<Reaction>,
    ) -> bool {
        let mut slots = self.lock();
        if !pending.is_empty() {
            return false;
        }

        let unused = match slots.peers.get_mut(peer) {
            Some(slot) if slot.queue.as_ref().is_some_and(|q| q.same_channel(own)) => {
                slot.queue = None;
                slot.is_unused()
            }
            _ => false,
        };
        if unused {
            slots.peers.remove(peer);
        }
        true
    }

    pub(super) fn state(&self, peer: &PeerId) -> ChannelState {
        self.lock()
            .peers
            .get(peer)
            .map(|slot| *slot.state.borrow())
            .unwrap_or_default()
    }

    /// Watch `peer` without starting a worker for it
    pub(super) fn subscribe(&self, peer: &PeerId) -> Result<watch::Receiver<ChannelState>, NegotiationError> {
        let mut slots = self.lock();
        if slots.closed {
            return Err(NegotiationError::Shutdown);
        }
        slots.prune();
        Ok(slots
            .peers
            .entry(peer.clone())
            .or_insert_with(PeerSlot::new)
            .state
            .subscribe())
    }

    /// Peers with a running worker
    pub(super) fn active(&self) -> Vec<(PeerId, ChannelState)> {
        let mut slots = self.lock();
        slots.prune();
        slots
            .peers
            .iter()
            .filter(|(_, slot)| slot.queue.is_some())
            .map(|(id, slot)| (id.clone(), *slot.state.borrow()))
            .collect()
    }

    /// Refuse new workers and hand back the queues of running ones
    pub(super) fn close(&self) -> Vec<(PeerId, mpsc::UnboundedSender<Reaction>)> {
        let mut slots = self.lock();
        slots.closed = true;
        slots
            .peers
            .drain()
            .filter_map(|(id, slot)| slot.queue.map(|queue| (id, queue)))
            .collect()
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.lock().peers.len()
    }
}
