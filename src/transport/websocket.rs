//! WebSocket client connection task
//!
//! One task per connection attempt. It reports open/message/close to the
//! coordinator queue and writes whatever text frames the channel hands it.
//! Dropping the writer closes the socket gracefully.

use crate::error::TransportError;
use crate::room::event::CoordinatorEvent;
use crate::transport::channel::{ConnectionId, TransportEvent};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;

/// Spawn the connection task for one attempt
pub fn spawn_connection(
    endpoint: String,
    connection: ConnectionId,
    keepalive: Option<Duration>,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let error = run_connection(&endpoint, connection, keepalive, &events).await.err();
        if let Some(ref e) = error {
            warn!("Signaling connection {} ended with error: {}", connection, e);
        } else {
            info!("Signaling connection {} closed", connection);
        }
        let _ = events.send(CoordinatorEvent::Transport(TransportEvent::Closed { connection, error }));
    })
}

async fn run_connection(
    endpoint: &str,
    connection: ConnectionId,
    keepalive: Option<Duration>,
    events: &mpsc::UnboundedSender<CoordinatorEvent>,
) -> Result<(), TransportError> {
    let (ws_stream, _response) = connect_async(endpoint).await.map_err(|e| TransportError::Connect {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    info!("Signaling connection {} established to {}", connection, endpoint);

    let (mut write, mut read) = ws_stream.split();
    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<String>();

    if events
        .send(CoordinatorEvent::Transport(TransportEvent::Opened { connection, writer: writer_tx }))
        .is_err()
    {
        let _ = write.send(Message::Close(None)).await;
        return Ok(());
    }

    // Callers never pass a zero period; interval() panics on it
    let mut ping = time::interval(keepalive.unwrap_or(Duration::from_secs(3600)));
    ping.tick().await;

    loop {
        tokio::select! {
            outbound = writer_rx.recv() => match outbound {
                Some(text) => {
                    write
                        .send(Message::Text(text.into()))
                        .await
                        .map_err(|e| TransportError::Send(e.to_string()))?;
                }
                None => {
                    debug!("Writer for connection {} dropped, closing", connection);
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
            },
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let event = TransportEvent::Message { connection, text: text.to_string() };
                    if events.send(CoordinatorEvent::Transport(event)).is_err() {
                        return Ok(());
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!("Ignoring {} byte binary frame on signaling channel", data.len());
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("Signaling server closed connection {}: {:?}", connection, frame);
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("WebSocket error on connection {}: {}", connection, e);
                    return Err(TransportError::Connection(e.to_string()));
                }
                None => return Ok(()),
            },
            _ = ping.tick(), if keepalive.is_some() => {
                write
                    .send(Message::Ping(Default::default()))
                    .await
                    .map_err(|e| TransportError::Send(e.to_string()))?;
            }
        }
    }
}
