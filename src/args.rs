use clap::Parser;
use std::path::PathBuf;

use meshroom::config;

#[derive(Parser, Debug)]
#[command(name = "meshroom")]
#[command(version)]
#[command(about = "Headless participant for a WebRTC mesh conference room", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/meshroom.toml")]
    pub config: PathBuf,

    /// Room to join (overrides signaling.room_id)
    #[arg(short, long)]
    pub room: Option<String>,

    /// Signaling server WebSocket URL (overrides signaling.url)
    #[arg(short, long)]
    pub url: Option<String>,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,
}

impl Args {
    pub fn load_config(&self) -> meshroom::Result<config::Config> {
        config::Config::load(&self.config)
    }

    /// Apply command line overrides on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut config::Config) {
        if let Some(ref room) = self.room {
            config.signaling.room_id = room.clone();
        }
        if let Some(ref url) = self.url {
            config.signaling.url = url.clone();
        }
        if self.verbose {
            config.logging.level = "debug".to_string();
        }
    }
}
