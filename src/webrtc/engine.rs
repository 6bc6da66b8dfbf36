//! Seam between the negotiation state machine and the native engine
//!
//! The native connectivity engine produces descriptions, gathers candidates
//! and reports connection state. Its callbacks never touch session state
//! directly; they post [`PeerEvent`]s through a [`PeerEventSink`] onto the
//! coordinator queue.

use crate::error::NegotiationError;
use crate::room::event::CoordinatorEvent;
use crate::webrtc::media_track::{LocalTrack, RemoteStream};
use crate::webrtc::signaling::{IceCandidate, ParticipantId, SessionDescription};
use async_trait::async_trait;
use log::trace;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;

/// Generation stamp distinguishing successive sessions for the same peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(pub u64);

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// ICE connectivity as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl IceConnectionState {
    /// States after which the session is torn down
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IceConnectionState::Disconnected | IceConnectionState::Failed | IceConnectionState::Closed
        )
    }
}

impl From<RTCIceConnectionState> for IceConnectionState {
    fn from(state: RTCIceConnectionState) -> Self {
        match state {
            RTCIceConnectionState::Checking => IceConnectionState::Checking,
            RTCIceConnectionState::Connected => IceConnectionState::Connected,
            RTCIceConnectionState::Completed => IceConnectionState::Completed,
            RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
            RTCIceConnectionState::Failed => IceConnectionState::Failed,
            RTCIceConnectionState::Closed => IceConnectionState::Closed,
            _ => IceConnectionState::New,
        }
    }
}

/// Something happened on one peer's native connection
#[derive(Debug)]
pub enum PeerEventKind {
    /// Engine wants a (re)negotiation
    NegotiationNeeded,
    /// Locally gathered candidate to trickle to the peer
    LocalCandidate(IceCandidate),
    /// Remote media arrived
    TrackReceived(RemoteStream),
    IceStateChanged(IceConnectionState),
    /// Spawned offer creation finished
    OfferCreated(Result<SessionDescription, NegotiationError>),
    /// Spawned answer creation finished
    AnswerCreated(Result<SessionDescription, NegotiationError>),
}

#[derive(Debug)]
pub struct PeerEvent {
    pub peer_id: ParticipantId,
    pub key: SessionKey,
    pub kind: PeerEventKind,
}

/// Posts events for one session onto the coordinator queue
#[derive(Clone)]
pub struct PeerEventSink {
    peer_id: ParticipantId,
    key: SessionKey,
    tx: mpsc::UnboundedSender<CoordinatorEvent>,
}

impl PeerEventSink {
    pub fn new(peer_id: ParticipantId, key: SessionKey, tx: mpsc::UnboundedSender<CoordinatorEvent>) -> Self {
        Self { peer_id, key, tx }
    }

    pub fn peer_id(&self) -> &ParticipantId {
        &self.peer_id
    }

    pub fn key(&self) -> SessionKey {
        self.key
    }

    /// Post an event; a closed queue means the coordinator is gone
    pub fn emit(&self, kind: PeerEventKind) {
        let event = PeerEvent {
            peer_id: self.peer_id.clone(),
            key: self.key,
            kind,
        };
        if self.tx.send(CoordinatorEvent::Peer(event)).is_err() {
            trace!("Dropping event for {} {}: coordinator stopped", self.peer_id, self.key);
        }
    }

    pub fn negotiation_needed(&self) {
        self.emit(PeerEventKind::NegotiationNeeded);
    }

    pub fn local_candidate(&self, candidate: IceCandidate) {
        self.emit(PeerEventKind::LocalCandidate(candidate));
    }

    pub fn track_received(&self, stream: RemoteStream) {
        self.emit(PeerEventKind::TrackReceived(stream));
    }

    pub fn ice_state_changed(&self, state: IceConnectionState) {
        self.emit(PeerEventKind::IceStateChanged(state));
    }
}

/// Creates native peer connections bound to an event sink
#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create(&self, sink: PeerEventSink) -> Result<Arc<dyn NativePeerConnection>, NegotiationError>;
}

/// One native peer connection, following the standard offer/answer/ICE contract
#[async_trait]
pub trait NativePeerConnection: Send + Sync {
    async fn add_track(&self, track: &LocalTrack) -> Result<(), NegotiationError>;

    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError>;

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), NegotiationError>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), NegotiationError>;

    /// Fails with [`NegotiationError::RemoteDescriptionMissing`] when no
    /// remote description has been applied yet
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), NegotiationError>;

    /// Stop delivering callbacks; must take effect before `close`
    fn detach_handlers(&self);

    async fn close(&self) -> Result<(), NegotiationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_ice_states() {
        assert!(IceConnectionState::Failed.is_terminal());
        assert!(IceConnectionState::Disconnected.is_terminal());
        assert!(IceConnectionState::Closed.is_terminal());
        assert!(!IceConnectionState::Checking.is_terminal());
        assert!(!IceConnectionState::Connected.is_terminal());
    }

    #[test]
    fn test_ice_state_from_rtc_state() {
        assert_eq!(IceConnectionState::from(RTCIceConnectionState::Failed), IceConnectionState::Failed);
        assert_eq!(IceConnectionState::from(RTCIceConnectionState::Unspecified), IceConnectionState::New);
    }

    #[tokio::test]
    async fn test_sink_stamps_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = PeerEventSink::new("B".into(), SessionKey(7), tx);
        sink.negotiation_needed();
        match rx.recv().await {
            Some(CoordinatorEvent::Peer(event)) => {
                assert_eq!(event.peer_id, ParticipantId::from("B"));
                assert_eq!(event.key, SessionKey(7));
                assert!(matches!(event.kind, PeerEventKind::NegotiationNeeded));
            }
            _ => panic!("Expected peer event"),
        }
    }
}
