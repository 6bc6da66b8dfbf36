//! webrtc-rs backed peer connections
//!
//! [`RtcEngine`] builds one webrtc-rs `API` and creates an
//! [`RTCPeerConnection`] per remote participant. Native callbacks are
//! translated into peer events and posted to the coordinator queue; they
//! never touch session state directly.

use crate::config::WebRTCConfig;
use crate::error::NegotiationError;
use crate::webrtc::engine::{IceConnectionState, NativePeerConnection, PeerConnectionFactory, PeerEventSink};
use crate::webrtc::media_track::{LocalTrack, RemoteStream, TrackKind};
use crate::webrtc::signaling::{IceCandidate, SdpKind, SessionDescription};
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

/// Creates webrtc-rs peer connections with the configured ICE servers
pub struct RtcEngine {
    api: API,
    ice_servers: Vec<RTCIceServer>,
}

impl RtcEngine {
    pub fn new(config: &WebRTCConfig) -> Result<Self, NegotiationError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| NegotiationError::ConnectionFailed(format!("Failed to register codecs: {}", e)))?;

        // Interceptors handle RTCP feedback (NACK, reports)
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| NegotiationError::ConnectionFailed(format!("Failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = config
            .ice_servers
            .iter()
            .map(|server| RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone(),
                credential: server.credential.clone(),
                ..Default::default()
            })
            .collect();

        Ok(Self { api, ice_servers })
    }
}

#[async_trait]
impl PeerConnectionFactory for RtcEngine {
    async fn create(&self, sink: PeerEventSink) -> Result<Arc<dyn NativePeerConnection>, NegotiationError> {
        let rtc_config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        };
        let peer_connection = self
            .api
            .new_peer_connection(rtc_config)
            .await
            .map_err(|e| NegotiationError::ConnectionFailed(format!("Failed to create peer connection: {}", e)))?;

        let peer = RtcPeer {
            inner: Arc::new(peer_connection),
            detached: Arc::new(AtomicBool::new(false)),
        };
        peer.wire_handlers(sink);
        Ok(Arc::new(peer))
    }
}

/// One native connection plus the flag that silences its callbacks
pub struct RtcPeer {
    inner: Arc<RTCPeerConnection>,
    detached: Arc<AtomicBool>,
}

impl RtcPeer {
    fn wire_handlers(&self, sink: PeerEventSink) {
        let (events, detached) = (sink.clone(), self.detached.clone());
        self.inner.on_negotiation_needed(Box::new(move || {
            if !detached.load(Ordering::SeqCst) {
                events.negotiation_needed();
            }
            Box::pin(async {})
        }));

        let (events, detached) = (sink.clone(), self.detached.clone());
        self.inner.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let events = events.clone();
            let detached = detached.clone();
            Box::pin(async move {
                // None marks the end of gathering
                let Some(candidate) = candidate else { return };
                if detached.load(Ordering::SeqCst) {
                    return;
                }
                match candidate.to_json() {
                    Ok(init) => events.local_candidate(IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                        username_fragment: init.username_fragment,
                    }),
                    Err(e) => warn!("Failed to serialize local candidate for {}: {}", events.peer_id(), e),
                }
            })
        }));

        let (events, detached) = (sink.clone(), self.detached.clone());
        self.inner.on_track(Box::new(
            move |track: Arc<TrackRemote>, _receiver: Arc<RTCRtpReceiver>, _transceiver: Arc<RTCRtpTransceiver>| {
                if !detached.load(Ordering::SeqCst) {
                    match TrackKind::from_codec_type(track.kind()) {
                        Some(kind) => events.track_received(RemoteStream {
                            peer_id: events.peer_id().clone(),
                            track_id: track.id(),
                            stream_id: track.stream_id(),
                            kind,
                            track: Some(track.clone()),
                        }),
                        None => debug!("Ignoring track of unknown kind from {}", events.peer_id()),
                    }
                }
                Box::pin(async {})
            },
        ));

        let (events, detached) = (sink, self.detached.clone());
        self.inner.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            if !detached.load(Ordering::SeqCst) {
                events.ice_state_changed(IceConnectionState::from(state));
            }
            Box::pin(async {})
        }));
    }
}

fn to_native(description: SessionDescription) -> Result<RTCSessionDescription, NegotiationError> {
    let parsed = match description.kind {
        SdpKind::Offer => RTCSessionDescription::offer(description.sdp),
        SdpKind::Answer => RTCSessionDescription::answer(description.sdp),
    };
    parsed.map_err(|e| NegotiationError::Sdp(format!("Invalid SDP: {}", e)))
}

#[async_trait]
impl NativePeerConnection for RtcPeer {
    async fn add_track(&self, track: &LocalTrack) -> Result<(), NegotiationError> {
        let sender = self
            .inner
            .add_track(track.as_track_local())
            .await
            .map_err(|e| NegotiationError::Track(format!("Failed to add {} track: {}", track.kind, e)))?;

        // RTCP has to be drained for the interceptors to work
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while sender.read(&mut rtcp_buf).await.is_ok() {}
        });
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError> {
        let offer = self
            .inner
            .create_offer(None)
            .await
            .map_err(|e| NegotiationError::Sdp(format!("Failed to create offer: {}", e)))?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError> {
        let answer = self
            .inner
            .create_answer(None)
            .await
            .map_err(|e| NegotiationError::Sdp(format!("Failed to create answer: {}", e)))?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), NegotiationError> {
        self.inner
            .set_local_description(to_native(description)?)
            .await
            .map_err(|e| NegotiationError::Sdp(format!("Failed to set local description: {}", e)))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), NegotiationError> {
        self.inner
            .set_remote_description(to_native(description)?)
            .await
            .map_err(|e| NegotiationError::Sdp(format!("Failed to set remote description: {}", e)))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), NegotiationError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        self.inner.add_ice_candidate(init).await.map_err(|e| match e {
            webrtc::Error::ErrNoRemoteDescription => NegotiationError::RemoteDescriptionMissing,
            other => NegotiationError::Ice(format!("Failed to add ICE candidate: {}", other)),
        })
    }

    fn detach_handlers(&self) {
        self.detached.store(true, Ordering::SeqCst);
        self.inner.on_negotiation_needed(Box::new(|| Box::pin(async {})));
        self.inner.on_ice_candidate(Box::new(|_: Option<RTCIceCandidate>| Box::pin(async {})));
        self.inner.on_track(Box::new(
            |_: Arc<TrackRemote>, _: Arc<RTCRtpReceiver>, _: Arc<RTCRtpTransceiver>| Box::pin(async {}),
        ));
        self.inner.on_ice_connection_state_change(Box::new(|_: RTCIceConnectionState| Box::pin(async {})));
    }

    async fn close(&self) -> Result<(), NegotiationError> {
        self.inner
            .close()
            .await
            .map_err(|e| NegotiationError::ConnectionFailed(format!("Failed to close connection: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::event::CoordinatorEvent;
    use crate::webrtc::engine::SessionKey;
    use tokio::sync::mpsc;

    fn sink(peer: &str) -> (PeerEventSink, mpsc::UnboundedReceiver<CoordinatorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (PeerEventSink::new(peer.into(), SessionKey(1), tx), rx)
    }

    #[tokio::test]
    async fn test_candidate_before_remote_description_is_benign() {
        let engine = RtcEngine::new(&WebRTCConfig { ice_servers: vec![], max_peers: 4 }).unwrap();
        let (sink, _rx) = sink("B");
        let peer = engine.create(sink).await.unwrap();
        let err = peer
            .add_ice_candidate(IceCandidate {
                candidate: "candidate:1 1 udp 2130706431 192.0.2.10 50000 typ host".to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_mline_index: Some(0),
                username_fragment: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_benign());
        peer.detach_handlers();
        peer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_offer_answer_between_engines() {
        let config = WebRTCConfig { ice_servers: vec![], max_peers: 4 };
        let engine = RtcEngine::new(&config).unwrap();
        let (sink_a, _rx_a) = sink("B");
        let (sink_b, _rx_b) = sink("A");
        let a = engine.create(sink_a).await.unwrap();
        let b = engine.create(sink_b).await.unwrap();

        for track in crate::testing::local_tracks() {
            a.add_track(&track).await.unwrap();
        }
        let offer = a.create_offer().await.unwrap();
        assert_eq!(offer.kind, SdpKind::Offer);
        a.set_local_description(offer.clone()).await.unwrap();

        b.set_remote_description(offer).await.unwrap();
        let answer = b.create_answer().await.unwrap();
        assert_eq!(answer.kind, SdpKind::Answer);
        b.set_local_description(answer.clone()).await.unwrap();
        a.set_remote_description(answer).await.unwrap();

        for peer in [a, b] {
            peer.detach_handlers();
            peer.close().await.unwrap();
        }
    }
}
