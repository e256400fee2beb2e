//! Connection registry
//!
//! A two-way mapping between relay-issued peer identities and transport
//! sessions. Both directions live behind one lock so every operation is
//! atomic with respect to the others; at any instant each identity maps to at
//! most one session and each session to at most one identity.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use parley_common::PeerId;

/// Relay-local handle for one live WebSocket connection
pub type SessionId = u64;

/// Pairs displaced by a [`ConnectionRegistry::register`] call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Eviction {
    /// Session the identity was previously bound to
    pub displaced_session: Option<SessionId>,
    /// Identity the session previously held
    pub replaced_identity: Option<PeerId>,
}

#[derive(Default)]
struct RegistryMaps {
    by_peer: HashMap<PeerId, SessionId>,
    by_session: HashMap<SessionId, PeerId>,
}

/// Bijective identity ⇄ session registry, owned by one relay
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    maps: Arc<RwLock<RegistryMaps>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `peer_id` to `session_id`
    ///
    /// Any existing pair sharing either half is removed first. Always
    /// succeeds; the returned [`Eviction`] reports what was displaced.
    pub async fn register(&self, peer_id: PeerId, session_id: SessionId) -> Eviction {
        let mut maps = self.maps.write().await;

        let displaced_session = maps.by_peer.remove(&peer_id);
        if let Some(old_session) = displaced_session {
            maps.by_session.remove(&old_session);
        }

        let replaced_identity = maps.by_session.remove(&session_id);
        if let Some(old_peer) = &replaced_identity {
            maps.by_peer.remove(old_peer);
        }

        maps.by_peer.insert(peer_id.clone(), session_id);
        maps.by_session.insert(session_id, peer_id.clone());

        Eviction {
            displaced_session: displaced_session.filter(|s| *s != session_id),
            replaced_identity: replaced_identity.filter(|p| *p != peer_id),
        }
    }

    pub async fn lookup_session(&self, peer_id: &PeerId) -> Option<SessionId> {
        self.maps.read().await.by_peer.get(peer_id).copied()
    }

    pub async fn lookup_identity(&self, session_id: SessionId) -> Option<PeerId> {
        self.maps.read().await.by_session.get(&session_id).cloned()
    }

    /// Remove the pair holding `session_id`, if any
    ///
    /// Returns the identity that was bound to the session.
    pub async fn remove_by_session(&self, session_id: SessionId) -> Option<PeerId> {
        let mut maps = self.maps.write().await;
        let peer_id = maps.by_session.remove(&session_id)?;
        maps.by_peer.remove(&peer_id);
        Some(peer_id)
    }

    /// Snapshot of every registered pair
    pub async fn entries(&self) -> Vec<(PeerId, SessionId)> {
        self.maps
            .read()
            .await
            .by_peer
            .iter()
            .map(|(peer_id, session_id)| (peer_id.clone(), *session_id))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.maps.read().await.by_peer.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
