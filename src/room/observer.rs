//! Callbacks towards the UI / embedding application

use crate::error::TransportError;
use crate::webrtc::media_track::RemoteStream;
use crate::webrtc::signaling::ParticipantId;

/// Consumer of stream lifecycle notifications
///
/// Called from the coordinator task; implementations must not block.
pub trait RoomObserver: Send + Sync {
    fn on_stream_added(&self, peer_id: &ParticipantId, stream: RemoteStream);

    /// Fires once per destroyed session
    fn on_stream_removed(&self, peer_id: &ParticipantId);

    /// The control connection closed; `reconnecting` tells whether the
    /// reconnect policy scheduled another attempt
    fn on_transport_closed(&self, _error: Option<&TransportError>, _reconnecting: bool) {}
}
