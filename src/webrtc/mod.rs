//! Peer-to-peer media negotiation
//!
//! This module provides:
//! - The signaling message model and its JSON wire format
//! - One negotiation state machine per remote participant
//! - The session pool owning every live session
//! - The seam to the native engine, with a webrtc-rs implementation

pub mod engine;
pub mod media_track;
pub mod peer_connection;
pub mod pool;
pub mod session;
pub mod signaling;

pub use engine::{NativePeerConnection, PeerConnectionFactory, PeerEvent, PeerEventKind, SessionKey};
pub use media_track::{LocalTrack, MediaSource, RemoteStream, SyntheticMediaSource, TrackKind};
pub use peer_connection::RtcEngine;
pub use pool::{PeerInfo, PeerSessionPool};
pub use session::{NegotiationState, PeerSession};
pub use signaling::{IceCandidate, MessageBody, MessageType, ParticipantId, SessionDescription, SignalingMessage};
