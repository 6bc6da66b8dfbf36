//! meshroom - multi-peer WebRTC conference coordinator
//!
//! Joins a room over a WebSocket signaling channel and negotiates one
//! peer connection per remote participant in a full mesh.

pub mod config;
pub mod error;
pub mod room;
pub mod transport;
pub mod webrtc;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use crate::config::{Config, MediaConfig, ReconnectConfig, VideoCodec, WebRTCConfig};
pub use crate::error::{Error, Result};
pub use crate::room::{Coordinator, CoordinatorHandle, RoomObserver};
pub use crate::webrtc::{ParticipantId, RemoteStream, RtcEngine, SignalingMessage, SyntheticMediaSource};
