//! Test doubles for the native engine and the observer

use crate::error::{NegotiationError, TransportError};
use crate::room::event::CoordinatorEvent;
use crate::room::observer::RoomObserver;
use crate::webrtc::engine::{
    IceConnectionState, NativePeerConnection, PeerConnectionFactory, PeerEvent, PeerEventKind, PeerEventSink,
};
use crate::webrtc::media_track::{LocalTrack, RemoteStream, TrackKind};
use crate::webrtc::signaling::{IceCandidate, ParticipantId, SessionDescription};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};

pub fn local_tracks() -> Vec<LocalTrack> {
    vec![
        LocalTrack::sample(TrackKind::Audio, MIME_TYPE_OPUS, "test-stream"),
        LocalTrack::sample(TrackKind::Video, MIME_TYPE_VP8, "test-stream"),
    ]
}

/// Wait for the next peer event, skipping anything else on the queue
pub async fn next_peer_event(rx: &mut mpsc::UnboundedReceiver<CoordinatorEvent>) -> PeerEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for a peer event")
            .expect("event queue closed");
        if let CoordinatorEvent::Peer(event) = event {
            return event;
        }
    }
}

#[derive(Default)]
struct Faults {
    fail_remote_description: AtomicBool,
}

#[derive(Default)]
struct MockState {
    senders: Vec<TrackKind>,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    remote_candidates: Vec<IceCandidate>,
    descriptions_created: usize,
    detached: bool,
    closed: bool,
}

/// In-memory peer connection that produces deterministic descriptions
pub struct MockConnection {
    local_id: String,
    sink: PeerEventSink,
    faults: Arc<Faults>,
    state: Mutex<MockState>,
}

impl MockConnection {
    pub fn new(local_id: &str, sink: PeerEventSink) -> Arc<Self> {
        Self::with_faults(local_id, sink, Arc::new(Faults::default()))
    }

    fn with_faults(local_id: &str, sink: PeerEventSink, faults: Arc<Faults>) -> Arc<Self> {
        Arc::new(Self {
            local_id: local_id.to_string(),
            sink,
            faults,
            state: Mutex::new(MockState::default()),
        })
    }

    fn emit(&self, kind: PeerEventKind) {
        if !self.state.lock().detached {
            self.sink.emit(kind);
        }
    }

    fn next_sdp(&self, label: &str) -> String {
        let mut state = self.state.lock();
        state.descriptions_created += 1;
        format!("{}-{}-{}-{}", label, self.local_id, self.sink.peer_id(), state.descriptions_created)
    }

    pub fn sender_kinds(&self) -> Vec<TrackKind> {
        self.state.lock().senders.clone()
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.state.lock().local_description.clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.state.lock().remote_description.clone()
    }

    pub fn remote_candidates(&self) -> Vec<IceCandidate> {
        self.state.lock().remote_candidates.clone()
    }

    pub fn is_detached(&self) -> bool {
        self.state.lock().detached
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Simulate the engine gathering a local candidate
    pub fn gather_candidate(&self, candidate: &str) {
        self.emit(PeerEventKind::LocalCandidate(IceCandidate {
            candidate: candidate.to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }));
    }

    pub fn report_ice_state(&self, state: IceConnectionState) {
        self.emit(PeerEventKind::IceStateChanged(state));
    }

    pub fn receive_track(&self, track_id: &str) {
        self.emit(PeerEventKind::TrackReceived(RemoteStream {
            peer_id: self.sink.peer_id().clone(),
            track_id: track_id.to_string(),
            stream_id: "remote-stream".to_string(),
            kind: TrackKind::Video,
            track: None,
        }));
    }
}

#[async_trait]
impl NativePeerConnection for MockConnection {
    async fn add_track(&self, track: &LocalTrack) -> Result<(), NegotiationError> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(NegotiationError::Closed);
            }
            state.senders.push(track.kind);
        }
        self.emit(PeerEventKind::NegotiationNeeded);
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError> {
        Ok(SessionDescription::offer(self.next_sdp("offer")))
    }

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError> {
        if self.state.lock().remote_description.is_none() {
            return Err(NegotiationError::Sdp("no remote offer to answer".to_string()));
        }
        Ok(SessionDescription::answer(self.next_sdp("answer")))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), NegotiationError> {
        self.state.lock().local_description = Some(description);
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), NegotiationError> {
        if self.faults.fail_remote_description.swap(false, Ordering::SeqCst) {
            return Err(NegotiationError::Sdp("malformed remote description".to_string()));
        }
        self.state.lock().remote_description = Some(description);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), NegotiationError> {
        let mut state = self.state.lock();
        if state.remote_description.is_none() {
            return Err(NegotiationError::RemoteDescriptionMissing);
        }
        state.remote_candidates.push(candidate);
        Ok(())
    }

    fn detach_handlers(&self) {
        self.state.lock().detached = true;
    }

    async fn close(&self) -> Result<(), NegotiationError> {
        self.state.lock().closed = true;
        Ok(())
    }
}

/// Factory handing out [`MockConnection`]s and remembering them
pub struct MockFactory {
    local_id: String,
    connections: Mutex<Vec<(ParticipantId, Arc<MockConnection>)>>,
    fail_create: AtomicBool,
    faults: Arc<Faults>,
    created: AtomicUsize,
}

impl MockFactory {
    pub fn new(local_id: &str) -> Arc<Self> {
        Arc::new(Self {
            local_id: local_id.to_string(),
            connections: Mutex::new(Vec::new()),
            fail_create: AtomicBool::new(false),
            faults: Arc::new(Faults::default()),
            created: AtomicUsize::new(0),
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Most recent connection created for `peer_id`
    pub fn connection(&self, peer_id: &ParticipantId) -> Option<Arc<MockConnection>> {
        self.connections
            .lock()
            .iter()
            .rev()
            .find(|(id, _)| id == peer_id)
            .map(|(_, connection)| connection.clone())
    }

    pub fn all_connections(&self) -> Vec<Arc<MockConnection>> {
        self.connections.lock().iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn fail_next_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    /// The next `set_remote_description` on any connection fails
    pub fn fail_next_remote_description(&self) {
        self.faults.fail_remote_description.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PeerConnectionFactory for MockFactory {
    async fn create(&self, sink: PeerEventSink) -> Result<Arc<dyn NativePeerConnection>, NegotiationError> {
        if self.fail_create.swap(false, Ordering::SeqCst) {
            return Err(NegotiationError::ConnectionFailed("injected failure".to_string()));
        }
        let peer_id = sink.peer_id().clone();
        let connection = MockConnection::with_faults(&self.local_id, sink, self.faults.clone());
        self.connections.lock().push((peer_id, connection.clone()));
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(connection)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObserverEvent {
    Added(ParticipantId, String),
    Removed(ParticipantId),
    TransportClosed { reconnecting: bool },
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObserverEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Stream notifications seen so far, transport closes excluded
    pub fn events(&self) -> Vec<ObserverEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| !matches!(e, ObserverEvent::TransportClosed { .. }))
            .cloned()
            .collect()
    }

    pub fn transport_closes(&self) -> Vec<bool> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ObserverEvent::TransportClosed { reconnecting } => Some(*reconnecting),
                _ => None,
            })
            .collect()
    }
}

impl RoomObserver for RecordingObserver {
    fn on_stream_added(&self, peer_id: &ParticipantId, stream: RemoteStream) {
        self.events.lock().push(ObserverEvent::Added(peer_id.clone(), stream.track_id));
    }

    fn on_stream_removed(&self, peer_id: &ParticipantId) {
        self.events.lock().push(ObserverEvent::Removed(peer_id.clone()));
    }

    fn on_transport_closed(&self, _error: Option<&TransportError>, reconnecting: bool) {
        self.events.lock().push(ObserverEvent::TransportClosed { reconnecting });
    }
}
