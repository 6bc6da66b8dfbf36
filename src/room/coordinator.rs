//! Room coordinator event loop
//!
//! Owns the transport channel and the dispatcher and drains the single
//! event queue that socket tasks, native callbacks and handles post to.
//! All session state is only touched from [`Coordinator::run`].

use crate::config::Config;
use crate::error::{Error, Result};
use crate::room::dispatcher::Dispatcher;
use crate::room::event::{Command, CoordinatorEvent};
use crate::room::observer::RoomObserver;
use crate::transport::channel::{CloseOutcome, TransportChannel, TransportEvent};
use crate::transport::reconnect::policy_from_config;
use crate::webrtc::engine::PeerConnectionFactory;
use crate::webrtc::media_track::MediaSource;
use crate::webrtc::pool::{PeerInfo, PeerSessionPool};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Cloneable remote control for a running coordinator
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<CoordinatorEvent>,
}

impl CoordinatorHandle {
    fn command(&self, command: Command) {
        if self.tx.send(CoordinatorEvent::Command(command)).is_err() {
            debug!("Coordinator already stopped");
        }
    }

    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    pub fn shutdown(&self) {
        self.command(Command::Shutdown);
    }

    /// Snapshot of the live peer sessions; empty once the loop has stopped
    pub async fn peers(&self) -> Vec<PeerInfo> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::ListPeers(reply));
        rx.await.unwrap_or_default()
    }
}

pub struct Coordinator {
    endpoint: String,
    channel: TransportChannel,
    dispatcher: Dispatcher,
    observer: Arc<dyn RoomObserver>,
    events_tx: mpsc::UnboundedSender<CoordinatorEvent>,
    events_rx: mpsc::UnboundedReceiver<CoordinatorEvent>,
}

impl Coordinator {
    /// Acquire local media and build the coordinator for `config`'s room.
    ///
    /// Media acquisition failure is fatal: without local tracks there is
    /// nothing to publish.
    pub async fn new(
        config: &Config,
        factory: Arc<dyn PeerConnectionFactory>,
        media: &dyn MediaSource,
        observer: Arc<dyn RoomObserver>,
    ) -> Result<Self> {
        let local_tracks = media.local_tracks().await?;
        info!("Acquired {} local track(s)", local_tracks.len());

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let channel = TransportChannel::new(config.signaling.room_id.clone(), events_tx.clone())
            .with_reconnect_policy(policy_from_config(&config.reconnect))
            .with_keepalive(Duration::from_secs(config.signaling.keepalive_secs));
        let pool = PeerSessionPool::new(factory, events_tx.clone(), config.webrtc.max_peers);

        Ok(Self {
            endpoint: config.signaling.endpoint(),
            channel,
            dispatcher: Dispatcher::new(pool, local_tracks, observer.clone()),
            observer,
            events_tx,
            events_rx,
        })
    }

    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle {
            tx: self.events_tx.clone(),
        }
    }

    /// Connect and process events.
    ///
    /// Returns after a shutdown command, or once the control connection is
    /// lost and the reconnect policy gave up; the latter reports the last
    /// transport error, if any.
    pub async fn run(mut self) -> Result<()> {
        info!("Joining room {} via {}", self.channel.room_id(), self.endpoint);
        self.channel.connect(&self.endpoint);

        while let Some(event) = self.events_rx.recv().await {
            if let Some(outcome) = self.process(event).await {
                return outcome;
            }
        }
        Ok(())
    }

    /// Handle one event; `Some` ends the loop with that result
    async fn process(&mut self, event: CoordinatorEvent) -> Option<Result<()>> {
        match event {
            CoordinatorEvent::Transport(event) => self.on_transport(event).await,
            CoordinatorEvent::Peer(event) => {
                self.dispatcher.handle_peer_event(event, &mut self.channel).await;
                None
            }
            CoordinatorEvent::Command(command) => self.on_command(command).await,
        }
    }

    async fn on_transport(&mut self, event: TransportEvent) -> Option<Result<()>> {
        match event {
            TransportEvent::Opened { connection, writer } => {
                self.channel.handle_open(connection, writer);
            }
            TransportEvent::Message { connection, text } => {
                if let Some(message) = self.channel.handle_message(connection, &text) {
                    self.dispatcher.handle_message(message).await;
                }
            }
            TransportEvent::Closed { connection, error } => {
                let CloseOutcome::Closed { error, retry_in } = self.channel.handle_closed(connection, error) else {
                    debug!("Ignoring close of stale {}", connection);
                    return None;
                };
                let destroyed = self.dispatcher.reset().await;
                if !destroyed.is_empty() {
                    info!("Control connection lost, closed {} peer session(s)", destroyed.len());
                }
                self.observer.on_transport_closed(error.as_ref(), retry_in.is_some());
                if retry_in.is_none() {
                    return Some(match error {
                        Some(e) => Err(Error::Transport(e)),
                        None => Ok(()),
                    });
                }
            }
            TransportEvent::ReconnectDue { timer } => {
                self.channel.handle_reconnect_due(timer);
            }
        }
        None
    }

    async fn on_command(&mut self, command: Command) -> Option<Result<()>> {
        match command {
            Command::Connect => self.channel.connect(&self.endpoint),
            Command::Disconnect => self.teardown().await,
            Command::Shutdown => {
                self.teardown().await;
                info!("Coordinator stopped");
                return Some(Ok(()));
            }
            Command::ListPeers(reply) => {
                if reply.send(self.dispatcher.pool().snapshot()).is_err() {
                    warn!("Peer list requester went away");
                }
            }
        }
        None
    }

    async fn teardown(&mut self) {
        self.channel.disconnect();
        self.dispatcher.reset().await;
    }
}
