//! The coordinator's single processing queue carries these

use crate::transport::channel::TransportEvent;
use crate::webrtc::engine::PeerEvent;
use crate::webrtc::pool::PeerInfo;
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum CoordinatorEvent {
    Transport(TransportEvent),
    Peer(PeerEvent),
    Command(Command),
}

/// Requests from a [`CoordinatorHandle`](crate::room::CoordinatorHandle)
#[derive(Debug)]
pub enum Command {
    /// Open the control connection again after a disconnect
    Connect,
    /// Close the control connection and tear down every session
    Disconnect,
    /// Like `Disconnect`, then stop the processing loop
    Shutdown,
    ListPeers(oneshot::Sender<Vec<PeerInfo>>),
}
