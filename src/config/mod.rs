//! Configuration management for meshroom

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Video codec for the published video track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    #[default]
    VP8,
    VP9,
}

impl VideoCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "h264",
            VideoCodec::VP8 => "vp8",
            VideoCodec::VP9 => "vp9",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Control connection configuration
    #[serde(default)]
    pub signaling: SignalingConfig,

    /// WebRTC configuration
    #[serde(default)]
    pub webrtc: WebRTCConfig,

    /// Local media configuration
    #[serde(default)]
    pub media: MediaConfig,

    /// Reconnect behaviour of the control connection
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingConfig {
    /// WebSocket URL of the signaling server
    #[serde(default = "default_signaling_url")]
    pub url: String,

    /// Room to join
    #[serde(default)]
    pub room_id: String,

    /// Query parameter carrying the room id
    #[serde(default = "default_room_query_param")]
    pub room_query_param: String,

    /// WebSocket ping interval in seconds, 0 disables
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
}

impl SignalingConfig {
    /// Connection URL with the room id appended as a query parameter
    pub fn endpoint(&self) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}{}={}", self.url, separator, self.room_query_param, self.room_id)
    }
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: default_signaling_url(),
            room_id: String::new(),
            room_query_param: default_room_query_param(),
            keepalive_secs: default_keepalive_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub credential: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebRTCConfig {
    /// STUN/TURN servers handed to every peer connection
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<IceServerConfig>,

    /// Upper bound on concurrent peer sessions
    #[serde(default = "default_max_peers")]
    pub max_peers: usize,
}

impl Default for WebRTCConfig {
    fn default() -> Self {
        Self {
            ice_servers: default_ice_servers(),
            max_peers: default_max_peers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Publish an audio track
    #[serde(default = "default_true")]
    pub audio: bool,

    /// Publish a video track
    #[serde(default = "default_true")]
    pub video: bool,

    #[serde(default)]
    pub video_codec: VideoCodec,

    /// Media stream id shared by the local tracks
    #[serde(default = "default_stream_id")]
    pub stream_id: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
            video_codec: VideoCodec::default(),
            stream_id: default_stream_id(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Reconnect after the control connection drops
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Give up after this many consecutive failures, 0 retries forever
    #[serde(default)]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_attempts: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.signaling.room_id.is_empty() {
            return Err(Error::Config("room_id must be set".to_string()));
        }

        if !self.signaling.url.starts_with("ws://") && !self.signaling.url.starts_with("wss://") {
            return Err(Error::Config(format!(
                "signaling url must be ws:// or wss://, got {}",
                self.signaling.url
            )));
        }

        if self.webrtc.max_peers == 0 {
            return Err(Error::Config("max_peers must be at least 1".to_string()));
        }

        if !self.media.audio && !self.media.video {
            return Err(Error::Config("at least one of audio/video must be enabled".to_string()));
        }

        if self.reconnect.enabled {
            if self.reconnect.initial_delay_ms == 0 {
                return Err(Error::Config("reconnect initial_delay_ms must be non-zero".to_string()));
            }
            if self.reconnect.multiplier < 1.0 {
                return Err(Error::Config("reconnect multiplier must be >= 1.0".to_string()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        let mut cfg = Config::default();
        cfg.signaling.room_id = "standup".to_string();
        cfg
    }

    #[test]
    fn validate_requires_room() {
        assert!(Config::default().validate().is_err());
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn validate_rejects_http_url() {
        let mut cfg = valid();
        cfg.signaling.url = "http://localhost:8080/ws".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_requires_some_media() {
        let mut cfg = valid();
        cfg.media.audio = false;
        cfg.media.video = false;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn endpoint_appends_room_query() {
        let mut cfg = valid();
        assert_eq!(cfg.signaling.endpoint(), "ws://localhost:8080/ws?roomId=standup");
        cfg.signaling.url = "wss://example.org/ws?token=abc".to_string();
        assert_eq!(cfg.signaling.endpoint(), "wss://example.org/ws?token=abc&roomId=standup");
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [signaling]
            room_id = "lobby"

            [media]
            video_codec = "h264"

            [reconnect]
            enabled = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.signaling.url, "ws://localhost:8080/ws");
        assert_eq!(cfg.signaling.keepalive_secs, 30);
        assert_eq!(cfg.media.video_codec, VideoCodec::H264);
        assert_eq!(cfg.media.video_codec.as_str(), "h264");
        assert!(cfg.media.audio);
        assert_eq!(cfg.webrtc.ice_servers.len(), 2);
        assert_eq!(cfg.webrtc.max_peers, 16);
        assert!(cfg.reconnect.enabled);
        assert_eq!(cfg.reconnect.initial_delay_ms, 1000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load(&PathBuf::from("/nonexistent/meshroom.toml")).unwrap();
        assert_eq!(cfg.logging.level, "info");
    }
}

fn default_true() -> bool {
    true
}

fn default_signaling_url() -> String {
    "ws://localhost:8080/ws".to_string()
}

fn default_room_query_param() -> String {
    "roomId".to_string()
}

fn default_keepalive_secs() -> u64 { 30 }

fn default_ice_servers() -> Vec<IceServerConfig> {
    ["stun:stun.l.google.com:19302", "stun:stun1.l.google.com:19302"]
        .iter()
        .map(|url| IceServerConfig {
            urls: vec![url.to_string()],
            username: String::new(),
            credential: String::new(),
        })
        .collect()
}

fn default_max_peers() -> usize { 16 }

fn default_stream_id() -> String {
    "meshroom".to_string()
}

fn default_initial_delay_ms() -> u64 { 1000 }
fn default_max_delay_ms() -> u64 { 30000 }
fn default_multiplier() -> f64 { 2.0 }

fn default_log_level() -> String {
    "info".to_string()
}
