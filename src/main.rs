//! meshroom - Main entry point
//!
//! Joins a conference room as a headless participant publishing synthetic
//! audio/video tracks, and logs the streams other participants send.

mod args;

use args::Args;
use clap::Parser;
use log::{error, info, warn};
use meshroom::config::Config;
use meshroom::error::TransportError;
use meshroom::{Coordinator, ParticipantId, RemoteStream, RoomObserver, RtcEngine, SyntheticMediaSource};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::signal;

/// Tracks received streams per participant and logs their lifecycle
#[derive(Default)]
struct LoggingObserver {
    streams: Mutex<HashMap<ParticipantId, Vec<String>>>,
}

impl RoomObserver for LoggingObserver {
    fn on_stream_added(&self, peer_id: &ParticipantId, stream: RemoteStream) {
        info!(
            "Stream from {}: {} track {} (stream {})",
            peer_id, stream.kind, stream.track_id, stream.stream_id
        );
        self.streams.lock().entry(peer_id.clone()).or_default().push(stream.track_id);
    }

    fn on_stream_removed(&self, peer_id: &ParticipantId) {
        let tracks = self.streams.lock().remove(peer_id).unwrap_or_default();
        info!("Participant {} gone ({} track(s) released)", peer_id, tracks.len());
    }

    fn on_transport_closed(&self, error: Option<&TransportError>, reconnecting: bool) {
        match (error, reconnecting) {
            (Some(e), true) => warn!("Signaling connection lost ({}), reconnecting", e),
            (Some(e), false) => error!("Signaling connection lost: {}", e),
            (None, true) => info!("Signaling connection closed, reconnecting"),
            (None, false) => info!("Signaling connection closed"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();
    let loaded = args.load_config();

    // Initialize logging with noise filtering for third-party WebRTC crates
    let log_level = if args.verbose {
        "debug".to_string()
    } else {
        loaded
            .as_ref()
            .map(|cfg| cfg.logging.level.clone())
            .unwrap_or_else(|_| "info".to_string())
    };
    env_logger::Builder::new()
        .parse_filters(&std::env::var("MESHROOM_LOG").unwrap_or(log_level))
        .filter_module("webrtc_ice", log::LevelFilter::Error)
        .filter_module("webrtc_dtls", log::LevelFilter::Error)
        .filter_module("webrtc_mdns", log::LevelFilter::Error)
        .filter_module("webrtc_srtp", log::LevelFilter::Error)
        .init();

    info!("meshroom v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match loaded {
        Ok(cfg) => {
            info!("Loaded configuration from {:?}", args.config);
            cfg
        }
        Err(e) => {
            warn!("Failed to load config: {}, using defaults", e);
            Config::default()
        }
    };
    args.apply_overrides(&mut config);

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(e.into());
    }

    let engine = Arc::new(RtcEngine::new(&config.webrtc)?);
    let media = SyntheticMediaSource::new(config.media.clone());
    let observer = Arc::new(LoggingObserver::default());

    let coordinator = match Coordinator::new(&config, engine, &media, observer).await {
        Ok(coordinator) => coordinator,
        Err(e) => {
            error!("Failed to start: {}", e);
            return Err(e.into());
        }
    };

    let handle = coordinator.handle();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, leaving room");
            handle.shutdown();
        }
    });

    if let Err(e) = coordinator.run().await {
        if e.is_fatal_to_caller() {
            error!("Coordinator failed: {}", e);
        } else {
            warn!("Coordinator stopped: {}", e);
        }
        return Err(e.into());
    }

    info!("meshroom stopped");
    Ok(())
}
