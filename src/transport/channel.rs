//! Control connection to one conference room
//!
//! The channel owns the outbound queue and the writer half of the live
//! connection. Everything it learns from the socket arrives as a
//! [`TransportEvent`] on the coordinator queue; the coordinator hands those
//! back to the channel, so the channel is only ever touched from one task.

use crate::error::TransportError;
use crate::room::event::CoordinatorEvent;
use crate::transport::reconnect::{NeverReconnect, ReconnectPolicy};
use crate::transport::websocket::spawn_connection;
use crate::webrtc::signaling::SignalingMessage;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Identifies one connection attempt so that late events from an older
/// socket can be told apart from the current one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Socket-level happenings, posted by the connection task
#[derive(Debug)]
pub enum TransportEvent {
    Opened {
        connection: ConnectionId,
        writer: mpsc::UnboundedSender<String>,
    },
    Message {
        connection: ConnectionId,
        text: String,
    },
    Closed {
        connection: ConnectionId,
        error: Option<TransportError>,
    },
    /// Reconnect timer fired; `timer` names the timer that was armed
    ReconnectDue { timer: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Open,
    Closed,
}

/// What the coordinator should do after a close notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Event belonged to a superseded connection
    Stale,
    /// Connection is gone; `retry_in` is set when a reconnect is scheduled
    Closed { error: Option<TransportError>, retry_in: Option<Duration> },
}

/// Sink for outbound signaling messages
pub trait SignalingSink {
    fn send(&mut self, message: SignalingMessage);
}

impl SignalingSink for Vec<SignalingMessage> {
    fn send(&mut self, message: SignalingMessage) {
        self.push(message);
    }
}

pub struct TransportChannel {
    room_id: String,
    endpoint: Option<String>,
    state: ChannelState,
    queue: VecDeque<SignalingMessage>,
    writer: Option<mpsc::UnboundedSender<String>>,
    connection: Option<ConnectionId>,
    next_connection: u64,
    task: Option<JoinHandle<()>>,
    keepalive: Option<Duration>,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
    policy: Box<dyn ReconnectPolicy>,
    attempt: u32,
    reconnect_timer: Option<(u64, JoinHandle<()>)>,
    next_timer: u64,
}

impl TransportChannel {
    pub fn new(room_id: impl Into<String>, events: mpsc::UnboundedSender<CoordinatorEvent>) -> Self {
        Self {
            room_id: room_id.into(),
            endpoint: None,
            state: ChannelState::Idle,
            queue: VecDeque::new(),
            writer: None,
            connection: None,
            next_connection: 0,
            task: None,
            keepalive: None,
            events,
            policy: Box::new(NeverReconnect),
            attempt: 0,
            reconnect_timer: None,
            next_timer: 0,
        }
    }

    pub fn with_reconnect_policy(mut self, policy: Box<dyn ReconnectPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Ping interval for the socket; zero disables keepalive
    pub fn with_keepalive(mut self, interval: Duration) -> Self {
        self.keepalive = (!interval.is_zero()).then_some(interval);
        self
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_timer.is_some()
    }

    /// Open the control connection; no-op while connecting or open
    pub fn connect(&mut self, endpoint: &str) {
        if matches!(self.state, ChannelState::Connecting | ChannelState::Open) {
            debug!("connect({}) ignored: channel is {:?}", endpoint, self.state);
            return;
        }
        self.endpoint = Some(endpoint.to_string());
        let connection = self.begin_connection();
        info!("Connecting {} to {}", connection, endpoint);
        self.task = Some(spawn_connection(
            endpoint.to_string(),
            connection,
            self.keepalive,
            self.events.clone(),
        ));
    }

    /// Allocate the id for a new attempt and enter `Connecting`
    fn begin_connection(&mut self) -> ConnectionId {
        self.cancel_reconnect();
        self.next_connection += 1;
        let connection = ConnectionId(self.next_connection);
        self.connection = Some(connection);
        self.state = ChannelState::Connecting;
        connection
    }

    /// Transmit now if open, otherwise queue until the connection opens
    pub fn send(&mut self, message: SignalingMessage) {
        if self.state == ChannelState::Open {
            self.transmit(&message);
        } else {
            debug!("Queueing {} until connection opens", message.message_type());
            self.queue.push_back(message);
        }
    }

    fn transmit(&mut self, message: &SignalingMessage) {
        let Some(writer) = self.writer.as_ref() else {
            warn!("No writer for open channel, dropping {}", message.message_type());
            return;
        };
        match message.to_json() {
            Ok(text) => {
                debug!("[signaling SEND] {}", text);
                if writer.send(text).is_err() {
                    warn!("Connection task gone, dropping {}", message.message_type());
                }
            }
            Err(e) => warn!("{}", TransportError::Encode(e.to_string())),
        }
    }

    /// Connection opened: flush the queue in order, then announce the room
    pub fn handle_open(&mut self, connection: ConnectionId, writer: mpsc::UnboundedSender<String>) -> bool {
        if self.connection != Some(connection) || self.state != ChannelState::Connecting {
            debug!("Ignoring open for stale {}", connection);
            return false;
        }
        self.state = ChannelState::Open;
        self.writer = Some(writer);
        self.attempt = 0;

        let pending: Vec<SignalingMessage> = self.queue.drain(..).collect();
        if !pending.is_empty() {
            info!("Flushing {} queued message(s) on {}", pending.len(), connection);
        }
        for message in &pending {
            self.transmit(message);
        }

        let join = SignalingMessage::join_room(self.room_id.clone());
        self.transmit(&join);
        info!("Joined room {} on {}", self.room_id, connection);
        true
    }

    /// Parse an inbound frame; malformed frames are logged and dropped
    pub fn handle_message(&self, connection: ConnectionId, text: &str) -> Option<SignalingMessage> {
        if self.connection != Some(connection) || self.state != ChannelState::Open {
            debug!("Ignoring frame from stale {}", connection);
            return None;
        }
        debug!("[signaling RECV] {}", text);
        match SignalingMessage::from_json(text) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("Failed to parse signaling message: {} ({})", e, truncate(text, 120));
                None
            }
        }
    }

    /// Connection task finished; consult the reconnect policy
    pub fn handle_closed(&mut self, connection: ConnectionId, error: Option<TransportError>) -> CloseOutcome {
        if self.connection != Some(connection) {
            return CloseOutcome::Stale;
        }
        self.connection = None;
        self.writer = None;
        self.task = None;
        self.state = ChannelState::Closed;

        self.attempt += 1;
        let retry_in = self.policy.should_reconnect(self.attempt, error.as_ref());
        if let Some(delay) = retry_in {
            info!("Reconnecting in {:?} (attempt {})", delay, self.attempt);
            self.arm_reconnect(delay);
        }
        CloseOutcome::Closed { error, retry_in }
    }

    fn arm_reconnect(&mut self, delay: Duration) {
        self.cancel_reconnect();
        self.next_timer += 1;
        let timer = self.next_timer;
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(CoordinatorEvent::Transport(TransportEvent::ReconnectDue { timer }));
        });
        self.reconnect_timer = Some((timer, handle));
    }

    fn cancel_reconnect(&mut self) {
        if let Some((timer, handle)) = self.reconnect_timer.take() {
            debug!("Cancelling reconnect timer {}", timer);
            handle.abort();
        }
    }

    /// Reconnect timer fired; only the timer armed last may reconnect
    pub fn handle_reconnect_due(&mut self, timer: u64) -> bool {
        match self.reconnect_timer {
            Some((armed, _)) if armed == timer && self.state == ChannelState::Closed => {}
            _ => {
                debug!("Ignoring superseded reconnect timer {}", timer);
                return false;
            }
        }
        self.reconnect_timer = None;
        match self.endpoint.clone() {
            Some(endpoint) => {
                self.connect(&endpoint);
                true
            }
            None => false,
        }
    }

    /// Close the connection and drop anything still queued; idempotent.
    /// A pending reconnect is cancelled and the attempt budget restarts.
    pub fn disconnect(&mut self) {
        self.cancel_reconnect();
        self.attempt = 0;
        if self.state == ChannelState::Idle && self.queue.is_empty() {
            return;
        }
        if !self.queue.is_empty() {
            debug!("Discarding {} queued message(s)", self.queue.len());
        }
        self.queue.clear();
        if let Some(connection) = self.connection.take() {
            info!("Disconnecting {}", connection);
        }
        // With a writer the task closes the socket itself once it is dropped
        if self.writer.take().is_none() {
            if let Some(task) = self.task.take() {
                task.abort();
            }
        }
        self.task = None;
        self.endpoint = None;
        self.state = ChannelState::Closed;
    }
}

impl SignalingSink for TransportChannel {
    fn send(&mut self, message: SignalingMessage) {
        TransportChannel::send(self, message);
    }
}

impl Drop for TransportChannel {
    fn drop(&mut self) {
        self.cancel_reconnect();
        if let Some(task) = self.task.take() {
            if self.writer.is_none() {
                task.abort();
            }
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
