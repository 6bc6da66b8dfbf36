//! Control connection to the signaling server
//!
//! A single WebSocket per room carries JSON signaling messages. The
//! channel queues outbound messages until the socket opens and consults a
//! reconnect policy when it closes.

pub mod channel;
pub mod reconnect;
pub mod websocket;

pub use channel::{ChannelState, CloseOutcome, ConnectionId, SignalingSink, TransportChannel, TransportEvent};
pub use reconnect::{ExponentialBackoff, NeverReconnect, ReconnectPolicy};
