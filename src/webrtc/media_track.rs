//! Local and remote media tracks
//!
//! Local tracks are owned by the [`MediaSource`] and shared read-only by
//! every peer session that attaches them. Sessions never stop a local track.

use crate::config::{MediaConfig, VideoCodec};
use crate::error::MediaError;
use crate::webrtc::signaling::ParticipantId;
use async_trait::async_trait;
use log::info;
use std::fmt;
use std::sync::Arc;
use webrtc::api::media_engine::{MIME_TYPE_H264, MIME_TYPE_OPUS, MIME_TYPE_VP8, MIME_TYPE_VP9};
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Media kind of a track; a peer gets at most one local sender per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }

    pub fn from_codec_type(kind: RTPCodecType) -> Option<Self> {
        match kind {
            RTPCodecType::Audio => Some(TrackKind::Audio),
            RTPCodecType::Video => Some(TrackKind::Video),
            _ => None,
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A locally captured track ready to be attached to peer connections
#[derive(Clone)]
pub struct LocalTrack {
    pub kind: TrackKind,
    pub track: Arc<TrackLocalStaticSample>,
}

impl LocalTrack {
    pub fn new(kind: TrackKind, track: Arc<TrackLocalStaticSample>) -> Self {
        Self { kind, track }
    }

    pub fn id(&self) -> &str {
        self.track.id()
    }

    /// Build a sample track for the given kind with a fresh id
    pub fn sample(kind: TrackKind, mime_type: &str, stream_id: &str) -> Self {
        let (clock_rate, channels) = match kind {
            TrackKind::Audio => (48000, 2),
            TrackKind::Video => (90000, 0),
        };
        let track = TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: mime_type.to_string(),
                clock_rate,
                channels,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            format!("{}-{}", kind, uuid::Uuid::new_v4()),
            stream_id.to_string(),
        );
        Self::new(kind, Arc::new(track))
    }

    pub(crate) fn as_track_local(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        self.track.clone()
    }
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("kind", &self.kind)
            .field("id", &self.id())
            .finish()
    }
}

/// A track received from a remote participant
#[derive(Clone)]
pub struct RemoteStream {
    pub peer_id: ParticipantId,
    pub track_id: String,
    pub stream_id: String,
    pub kind: TrackKind,
    /// Native track handle; absent when the engine does not expose one
    pub track: Option<Arc<TrackRemote>>,
}

impl fmt::Debug for RemoteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStream")
            .field("peer_id", &self.peer_id)
            .field("track_id", &self.track_id)
            .field("stream_id", &self.stream_id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Supplier of local capture tracks
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Acquire the local tracks. Failure means no outbound media is possible.
    async fn local_tracks(&self) -> Result<Vec<LocalTrack>, MediaError>;
}

/// Media source producing empty sample tracks, for headless participants
///
/// Nothing is written to the tracks; they exist so that negotiation carries
/// real send m-lines.
pub struct SyntheticMediaSource {
    config: MediaConfig,
}

impl SyntheticMediaSource {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }
}

fn video_mime_type(codec: VideoCodec) -> &'static str {
    match codec {
        VideoCodec::H264 => MIME_TYPE_H264,
        VideoCodec::VP8 => MIME_TYPE_VP8,
        VideoCodec::VP9 => MIME_TYPE_VP9,
    }
}

#[async_trait]
impl MediaSource for SyntheticMediaSource {
    async fn local_tracks(&self) -> Result<Vec<LocalTrack>, MediaError> {
        let mut tracks = Vec::new();
        if self.config.audio {
            tracks.push(LocalTrack::sample(TrackKind::Audio, MIME_TYPE_OPUS, &self.config.stream_id));
        }
        if self.config.video {
            tracks.push(LocalTrack::sample(
                TrackKind::Video,
                video_mime_type(self.config.video_codec),
                &self.config.stream_id,
            ));
        }
        if tracks.is_empty() {
            return Err(MediaError::NoTracks);
        }
        info!(
            "Synthetic media source created {} track(s) (video codec {})",
            tracks.len(),
            self.config.video_codec.as_str()
        );
        Ok(tracks)
    }
}
