//! Peer session pool
//!
//! The pool is the only owner of [`PeerSession`]s. At most one live session
//! exists per participant; destroying a session releases everything it held.

use crate::error::NegotiationError;
use crate::room::event::CoordinatorEvent;
use crate::webrtc::engine::{PeerConnectionFactory, PeerEventSink, SessionKey};
use crate::webrtc::session::{NegotiationState, PeerSession};
use crate::webrtc::signaling::ParticipantId;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Point-in-time view of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub peer_id: ParticipantId,
    pub key: SessionKey,
    pub state: NegotiationState,
    pub age: Duration,
}

pub struct PeerSessionPool {
    sessions: HashMap<ParticipantId, PeerSession>,
    factory: Arc<dyn PeerConnectionFactory>,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
    next_key: u64,
    max_peers: usize,
}

impl PeerSessionPool {
    pub fn new(
        factory: Arc<dyn PeerConnectionFactory>,
        events: mpsc::UnboundedSender<CoordinatorEvent>,
        max_peers: usize,
    ) -> Self {
        Self {
            sessions: HashMap::new(),
            factory,
            events,
            next_key: 0,
            max_peers,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, peer_id: &ParticipantId) -> bool {
        self.sessions.contains_key(peer_id)
    }

    pub fn get(&self, peer_id: &ParticipantId) -> Option<&PeerSession> {
        self.sessions.get(peer_id)
    }

    pub fn get_mut(&mut self, peer_id: &ParticipantId) -> Option<&mut PeerSession> {
        self.sessions.get_mut(peer_id)
    }

    /// Session for `peer_id` if it is the one identified by `key`
    pub fn get_current(&mut self, peer_id: &ParticipantId, key: SessionKey) -> Option<&mut PeerSession> {
        self.sessions.get_mut(peer_id).filter(|session| session.key() == key)
    }

    /// Return the live session for `peer_id`, creating and wiring one if absent
    pub async fn get_or_create(&mut self, peer_id: &ParticipantId) -> Result<&mut PeerSession, NegotiationError> {
        if !self.sessions.contains_key(peer_id) {
            if self.sessions.len() >= self.max_peers {
                return Err(NegotiationError::SessionLimit(self.max_peers));
            }
            self.next_key += 1;
            let key = SessionKey(self.next_key);
            let sink = PeerEventSink::new(peer_id.clone(), key, self.events.clone());
            let connection = self.factory.create(sink.clone()).await?;
            self.sessions.insert(peer_id.clone(), PeerSession::new(connection, sink));
            info!("Created peer session for {} {}", peer_id, key);
        }
        self.sessions.get_mut(peer_id).ok_or(NegotiationError::Closed)
    }

    /// Tear down the session for `peer_id`; returns false if there was none
    pub async fn destroy(&mut self, peer_id: &ParticipantId) -> bool {
        let Some(mut session) = self.sessions.remove(peer_id) else {
            return false;
        };
        if let Err(e) = session.close().await {
            warn!("Error closing peer connection for {}: {}", peer_id, e);
        }
        info!("Removed peer session for {} ({} remaining)", peer_id, self.sessions.len());
        true
    }

    /// Destroy every session; keys are snapshotted before any removal
    pub async fn destroy_all(&mut self) -> Vec<ParticipantId> {
        let mut peers: Vec<ParticipantId> = self.sessions.keys().cloned().collect();
        peers.sort();
        let mut destroyed = Vec::with_capacity(peers.len());
        for peer_id in peers {
            if self.destroy(&peer_id).await {
                destroyed.push(peer_id);
            }
        }
        destroyed
    }

    pub fn snapshot(&self) -> Vec<PeerInfo> {
        let mut peers: Vec<PeerInfo> = self
            .sessions
            .values()
            .map(|session| PeerInfo {
                peer_id: session.peer_id().clone(),
                key: session.key(),
                state: session.state(),
                age: session.age(),
            })
            .collect();
        peers.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        peers
    }
}
