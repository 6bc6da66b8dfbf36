//! Inbound message routing
//!
//! Room-level messages (`your_info`, joins, leaves) are handled here; offers,
//! answers and candidates are forwarded to the addressed peer session.
//! Failures of one peer are contained: the session is destroyed, the
//! observer is told, and nothing else is affected.

use crate::error::{NegotiationError, ProtocolError};
use crate::room::observer::RoomObserver;
use crate::transport::channel::SignalingSink;
use crate::webrtc::engine::{PeerEvent, PeerEventKind};
use crate::webrtc::media_track::LocalTrack;
use crate::webrtc::pool::PeerSessionPool;
use crate::webrtc::session::{CandidateOutcome, OfferOutcome};
use crate::webrtc::signaling::{
    IceCandidate, MessageBody, MessageType, ParticipantId, SessionDescription, SignalingMessage,
};
use log::{debug, info, warn};
use std::sync::Arc;

pub struct Dispatcher {
    local_id: Option<ParticipantId>,
    pool: PeerSessionPool,
    local_tracks: Vec<LocalTrack>,
    observer: Arc<dyn RoomObserver>,
}

impl Dispatcher {
    pub fn new(pool: PeerSessionPool, local_tracks: Vec<LocalTrack>, observer: Arc<dyn RoomObserver>) -> Self {
        Self {
            local_id: None,
            pool,
            local_tracks,
            observer,
        }
    }

    pub fn local_id(&self) -> Option<&ParticipantId> {
        self.local_id.as_ref()
    }

    pub fn pool(&self) -> &PeerSessionPool {
        &self.pool
    }

    /// Route one inbound message
    ///
    /// Replies (answers, offers) are not produced here; they come back as
    /// peer events once the native connection has created them.
    pub async fn handle_message(&mut self, message: SignalingMessage) {
        let kind = message.message_type();
        let SignalingMessage { sender_id, target_user_id, body } = message;

        match body {
            MessageBody::YourInfo { user_id } => self.set_local_id(user_id),
            MessageBody::JoinRoom { room_id } => debug!("Ignoring inbound join-room for {}", room_id),
            body => {
                let Some(sender) = self.accepted_sender(kind, sender_id, target_user_id.as_ref()) else {
                    return;
                };
                match body {
                    MessageBody::UserConnected => self.on_user_connected(sender).await,
                    MessageBody::UserDisconnected => {
                        info!("Participant {} left", sender);
                        self.remove_peer(&sender).await;
                    }
                    MessageBody::VideoOffer { offer } => self.on_offer(sender, offer).await,
                    MessageBody::VideoAnswer { answer } => self.on_answer(sender, answer).await,
                    MessageBody::IceCandidate { candidate } => self.on_remote_candidate(sender, candidate).await,
                    MessageBody::YourInfo { .. } | MessageBody::JoinRoom { .. } => {}
                }
            }
        }
    }

    /// Sender of a peer-addressed message, or `None` if it is not for us
    fn accepted_sender(
        &self,
        kind: MessageType,
        sender_id: Option<ParticipantId>,
        target: Option<&ParticipantId>,
    ) -> Option<ParticipantId> {
        let Some(sender) = sender_id else {
            warn!("{}", ProtocolError::MissingSender { kind: kind.to_string() });
            return None;
        };
        if self.local_id.as_ref() == Some(&sender) {
            debug!("Ignoring own {} echoed back", kind);
            return None;
        }
        if let (Some(target), Some(local)) = (target, &self.local_id) {
            if target != local {
                debug!("Ignoring {} from {} addressed to {}", kind, sender, target);
                return None;
            }
        }
        Some(sender)
    }

    fn set_local_id(&mut self, user_id: ParticipantId) {
        match &self.local_id {
            None => {
                info!("Local participant id assigned: {}", user_id);
                self.local_id = Some(user_id);
            }
            Some(existing) if *existing == user_id => {
                debug!("Duplicate your_info for {}", user_id);
            }
            Some(existing) => {
                warn!("Ignoring your_info {}: local id already {}", user_id, existing);
            }
        }
    }

    async fn on_user_connected(&mut self, peer_id: ParticipantId) {
        if self.local_id.is_none() {
            warn!("user_connected from {} before local id is known, dropping", peer_id);
            return;
        }
        info!("Participant {} joined", peer_id);
        let attached = match self.pool.get_or_create(&peer_id).await {
            Ok(session) => session.attach_local_tracks(&self.local_tracks).await,
            Err(e) => {
                warn!("Could not create session for {}: {}", peer_id, e);
                return;
            }
        };
        if let Err(e) = attached {
            self.fail_session(&peer_id, e).await;
        }
    }

    async fn on_offer(&mut self, peer_id: ParticipantId, offer: SessionDescription) {
        if self.local_id.is_none() {
            warn!("video_offer from {} before local id is known, dropping", peer_id);
            return;
        }
        let session = match self.pool.get_or_create(&peer_id).await {
            Ok(session) => session,
            Err(e) => {
                warn!("Could not create session for {}: {}", peer_id, e);
                return;
            }
        };
        let result = match session.attach_local_tracks(&self.local_tracks).await {
            Ok(_) => session.apply_remote_offer(offer).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(OfferOutcome::Accepted) => debug!("Accepted offer from {}", peer_id),
            Ok(OfferOutcome::Ignored(state)) => {
                info!("Glare with {}: offer ignored in state {}", peer_id, state.as_str())
            }
            Err(e) => self.fail_session(&peer_id, e).await,
        }
    }

    async fn on_answer(&mut self, peer_id: ParticipantId, answer: SessionDescription) {
        let Some(session) = self.pool.get_mut(&peer_id) else {
            warn!("video_answer dropped: {}", ProtocolError::UnknownSender(peer_id.to_string()));
            return;
        };
        let applied = session.apply_remote_answer(answer).await;
        match applied {
            Ok(true) => info!("Negotiation with {} complete", peer_id),
            Ok(false) => debug!("Stale answer from {} ignored", peer_id),
            Err(e) => self.fail_session(&peer_id, e).await,
        }
    }

    async fn on_remote_candidate(&mut self, peer_id: ParticipantId, candidate: IceCandidate) {
        let Some(session) = self.pool.get_mut(&peer_id) else {
            warn!("ice_candidate dropped: {}", ProtocolError::UnknownSender(peer_id.to_string()));
            return;
        };
        match session.add_remote_candidate(candidate).await {
            Ok(CandidateOutcome::Applied) => {}
            Ok(CandidateOutcome::Buffered) => debug!("Buffered early candidate from {}", peer_id),
            Err(e) if e.is_benign() => debug!("Early candidate from {}: {}", peer_id, e),
            Err(e) => warn!("Failed to apply candidate from {}: {}", peer_id, e),
        }
    }

    /// Handle an event raised by a session's native connection or task
    pub async fn handle_peer_event<S: SignalingSink>(&mut self, event: PeerEvent, out: &mut S) {
        let PeerEvent { peer_id, key, kind } = event;
        let Some(session) = self.pool.get_current(&peer_id, key) else {
            debug!("Dropping event for stale session {} {}", peer_id, key);
            return;
        };

        match kind {
            PeerEventKind::NegotiationNeeded => {
                session.on_negotiation_needed();
            }
            PeerEventKind::LocalCandidate(candidate) => {
                self.send(out, SignalingMessage::ice_candidate(peer_id, candidate));
            }
            PeerEventKind::TrackReceived(stream) => {
                info!("Received {} track {} from {}", stream.kind, stream.track_id, peer_id);
                session.record_remote_stream(stream.clone());
                self.observer.on_stream_added(&peer_id, stream);
            }
            PeerEventKind::IceStateChanged(state) => {
                if session.on_ice_state(state) {
                    info!("ICE for {} reached {:?}, closing session", peer_id, state);
                    self.remove_peer(&peer_id).await;
                }
            }
            PeerEventKind::OfferCreated(result) => {
                let offer = session.on_offer_created(result).await;
                match offer {
                    Ok(Some(offer)) => self.send(out, SignalingMessage::video_offer(peer_id, offer)),
                    Ok(None) => {}
                    Err(e) => self.fail_session(&peer_id, e).await,
                }
            }
            PeerEventKind::AnswerCreated(result) => {
                let answer = session.on_answer_created(result).await;
                match answer {
                    Ok(Some(answer)) => self.send(out, SignalingMessage::video_answer(peer_id, answer)),
                    Ok(None) => {}
                    Err(e) => self.fail_session(&peer_id, e).await,
                }
            }
        }
    }

    fn send<S: SignalingSink>(&self, out: &mut S, message: SignalingMessage) {
        let message = match &self.local_id {
            Some(local) => message.from_sender(local.clone()),
            None => message,
        };
        out.send(message);
    }

    /// Destroy the session and notify the observer; no-op for unknown peers
    async fn remove_peer(&mut self, peer_id: &ParticipantId) -> bool {
        if self.pool.destroy(peer_id).await {
            self.observer.on_stream_removed(peer_id);
            true
        } else {
            false
        }
    }

    async fn fail_session(&mut self, peer_id: &ParticipantId, err: NegotiationError) {
        warn!("Negotiation with {} failed: {}", peer_id, err);
        self.remove_peer(peer_id).await;
    }

    /// Transport is gone: destroy every session and forget the local id
    pub async fn reset(&mut self) -> Vec<ParticipantId> {
        let destroyed = self.pool.destroy_all().await;
        for peer_id in &destroyed {
            self.observer.on_stream_removed(peer_id);
        }
        if let Some(local) = self.local_id.take() {
            info!("Released local id {} and {} session(s)", local, destroyed.len());
        }
        destroyed
    }
}
