//! Per-peer negotiation state machine
//!
//! One [`PeerSession`] per remote participant. The session owns the native
//! connection handle and decides, from its negotiation state, whether an
//! offer may be created, an answer applied, or an inbound offer accepted.
//! Description creation runs on spawned tasks whose results come back as
//! peer events, so the state is re-checked when they land.

use crate::error::NegotiationError;
use crate::webrtc::engine::{
    IceConnectionState, NativePeerConnection, PeerEventKind, PeerEventSink, SessionKey,
};
use crate::webrtc::media_track::{LocalTrack, RemoteStream, TrackKind};
use crate::webrtc::signaling::{IceCandidate, ParticipantId, SessionDescription};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where the offer/answer exchange with one peer stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    Closed,
}

impl NegotiationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationState::Stable => "stable",
            NegotiationState::HaveLocalOffer => "have-local-offer",
            NegotiationState::HaveRemoteOffer => "have-remote-offer",
            NegotiationState::Closed => "closed",
        }
    }
}

/// Result of handing an inbound offer to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOutcome {
    /// Remote offer applied, answer creation started
    Accepted,
    /// Session was not stable; offer dropped
    Ignored(NegotiationState),
}

/// Result of handing a remote candidate to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOutcome {
    Applied,
    /// Held until the remote description is applied
    Buffered,
}

pub struct PeerSession {
    peer_id: ParticipantId,
    key: SessionKey,
    state: NegotiationState,
    connection: Arc<dyn NativePeerConnection>,
    sink: PeerEventSink,
    attached: HashSet<TrackKind>,
    remote_streams: Vec<RemoteStream>,
    pending_candidates: Vec<IceCandidate>,
    remote_description_set: bool,
    /// Transition count when the outstanding offer creation started
    offer_started_at: Option<u64>,
    transitions: u64,
    ice_state: IceConnectionState,
    created_at: Instant,
}

impl PeerSession {
    pub fn new(connection: Arc<dyn NativePeerConnection>, sink: PeerEventSink) -> Self {
        Self {
            peer_id: sink.peer_id().clone(),
            key: sink.key(),
            state: NegotiationState::Stable,
            connection,
            sink,
            attached: HashSet::new(),
            remote_streams: Vec::new(),
            pending_candidates: Vec::new(),
            remote_description_set: false,
            offer_started_at: None,
            transitions: 0,
            ice_state: IceConnectionState::New,
            created_at: Instant::now(),
        }
    }

    pub fn peer_id(&self) -> &ParticipantId {
        &self.peer_id
    }

    pub fn key(&self) -> SessionKey {
        self.key
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn ice_state(&self) -> IceConnectionState {
        self.ice_state
    }

    pub fn is_closed(&self) -> bool {
        self.state == NegotiationState::Closed
    }

    pub fn offer_in_flight(&self) -> bool {
        self.offer_started_at.is_some()
    }

    pub fn attached_kinds(&self) -> &HashSet<TrackKind> {
        &self.attached
    }

    pub fn remote_streams(&self) -> &[RemoteStream] {
        &self.remote_streams
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    fn set_state(&mut self, state: NegotiationState) {
        if self.state != state {
            debug!("Session {} {} state change: {:?} -> {:?}", self.peer_id, self.key, self.state, state);
            self.state = state;
            self.transitions += 1;
        }
    }

    fn ensure_open(&self) -> Result<(), NegotiationError> {
        if self.is_closed() {
            Err(NegotiationError::Closed)
        } else {
            Ok(())
        }
    }

    /// Attach local tracks whose kind is not attached yet; returns how many were added
    pub async fn attach_local_tracks(&mut self, tracks: &[LocalTrack]) -> Result<usize, NegotiationError> {
        self.ensure_open()?;
        let mut added = 0;
        for track in tracks {
            if self.attached.contains(&track.kind) {
                continue;
            }
            self.connection.add_track(track).await?;
            self.attached.insert(track.kind);
            added += 1;
            debug!("Attached local {} track {} to {}", track.kind, track.id(), self.peer_id);
        }
        Ok(added)
    }

    /// Negotiation trigger; starts offer creation only from a quiet `Stable`
    pub fn on_negotiation_needed(&mut self) -> bool {
        if self.state != NegotiationState::Stable || self.offer_in_flight() {
            debug!(
                "Skipping negotiation for {}: state {:?}, offer in flight {}",
                self.peer_id,
                self.state,
                self.offer_in_flight()
            );
            return false;
        }
        self.offer_started_at = Some(self.transitions);

        let connection = self.connection.clone();
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let result = connection.create_offer().await;
            sink.emit(PeerEventKind::OfferCreated(result));
        });
        true
    }

    /// Offer creation finished. Returns the offer to send, or `None` when the
    /// state moved at all while it was being created, even if it is back to
    /// `Stable` by now.
    pub async fn on_offer_created(
        &mut self,
        result: Result<SessionDescription, NegotiationError>,
    ) -> Result<Option<SessionDescription>, NegotiationError> {
        let started_at = self.offer_started_at.take();
        let offer = result?;
        if self.state != NegotiationState::Stable || started_at != Some(self.transitions) {
            info!("Discarding offer for {}: state changed to {:?}", self.peer_id, self.state);
            return Ok(None);
        }
        self.connection.set_local_description(offer.clone()).await?;
        self.set_state(NegotiationState::HaveLocalOffer);
        Ok(Some(offer))
    }

    /// Inbound offer. Accepted only while `Stable`; first offer wins.
    pub async fn apply_remote_offer(&mut self, offer: SessionDescription) -> Result<OfferOutcome, NegotiationError> {
        self.ensure_open()?;
        if self.state != NegotiationState::Stable {
            warn!("Ignoring offer from {} while {:?}", self.peer_id, self.state);
            return Ok(OfferOutcome::Ignored(self.state));
        }
        self.connection.set_remote_description(offer).await?;
        self.set_state(NegotiationState::HaveRemoteOffer);
        self.on_remote_description_applied().await;

        let connection = self.connection.clone();
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let result = connection.create_answer().await;
            sink.emit(PeerEventKind::AnswerCreated(result));
        });
        Ok(OfferOutcome::Accepted)
    }

    /// Answer creation finished. Returns the answer to send back.
    pub async fn on_answer_created(
        &mut self,
        result: Result<SessionDescription, NegotiationError>,
    ) -> Result<Option<SessionDescription>, NegotiationError> {
        let answer = result?;
        if self.state != NegotiationState::HaveRemoteOffer {
            info!("Discarding answer for {}: state is {:?}", self.peer_id, self.state);
            return Ok(None);
        }
        self.connection.set_local_description(answer.clone()).await?;
        self.set_state(NegotiationState::Stable);
        Ok(Some(answer))
    }

    /// Remote answer to our offer. Returns false when it was stale.
    pub async fn apply_remote_answer(&mut self, answer: SessionDescription) -> Result<bool, NegotiationError> {
        if self.state != NegotiationState::HaveLocalOffer {
            debug!("Ignoring answer from {} while {:?}", self.peer_id, self.state);
            return Ok(false);
        }
        self.connection.set_remote_description(answer).await?;
        self.set_state(NegotiationState::Stable);
        self.on_remote_description_applied().await;
        Ok(true)
    }

    /// Flush candidates that arrived ahead of the remote description
    async fn on_remote_description_applied(&mut self) {
        self.remote_description_set = true;
        let pending = std::mem::take(&mut self.pending_candidates);
        if !pending.is_empty() {
            debug!("Applying {} buffered candidate(s) for {}", pending.len(), self.peer_id);
        }
        for candidate in pending {
            if let Err(e) = self.connection.add_ice_candidate(candidate).await {
                if e.is_benign() {
                    debug!("Buffered candidate for {} still early: {}", self.peer_id, e);
                } else {
                    warn!("Failed to apply buffered candidate for {}: {}", self.peer_id, e);
                }
            }
        }
    }

    /// Remote candidate; applied now, or held until a remote description exists
    pub async fn add_remote_candidate(&mut self, candidate: IceCandidate) -> Result<CandidateOutcome, NegotiationError> {
        self.ensure_open()?;
        if !self.remote_description_set {
            self.pending_candidates.push(candidate);
            return Ok(CandidateOutcome::Buffered);
        }
        self.connection.add_ice_candidate(candidate).await?;
        Ok(CandidateOutcome::Applied)
    }

    pub fn record_remote_stream(&mut self, stream: RemoteStream) {
        self.remote_streams.push(stream);
    }

    /// Record the new ICE state; returns true when the session must be torn down
    pub fn on_ice_state(&mut self, state: IceConnectionState) -> bool {
        debug!("Session {} ICE state: {:?} -> {:?}", self.peer_id, self.ice_state, state);
        self.ice_state = state;
        state.is_terminal()
    }

    /// Tear down: detach callbacks first, then release the native handle
    pub async fn close(&mut self) -> Result<(), NegotiationError> {
        if self.is_closed() {
            return Ok(());
        }
        self.connection.detach_handlers();
        self.set_state(NegotiationState::Closed);
        self.offer_started_at = None;
        self.pending_candidates.clear();
        self.remote_streams.clear();
        self.connection.close().await?;
        info!("Session {} {} closed after {:?}", self.peer_id, self.key, self.age());
        Ok(())
    }
}
