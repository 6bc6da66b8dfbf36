//! Error types for the room coordinator
//!
//! Failures are split by blast radius: transport and media errors reach the
//! caller, protocol errors are dropped at the dispatcher, negotiation errors
//! stay inside the one peer session that produced them.

/// Result type alias using the coordinator [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error returned by the coordinator and its collaborators
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Control-connection failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Could not establish the WebSocket connection
    #[error("Connect to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    /// Writing a frame to the socket failed
    #[error("Send failed: {0}")]
    Send(String),

    /// The socket reported an error while reading
    #[error("Connection lost: {0}")]
    Connection(String),

    /// Outbound message could not be encoded
    #[error("Failed to encode message: {0}")]
    Encode(String),
}

impl TransportError {
    /// Whether a reconnect attempt can reasonably succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Encode(_))
    }
}

/// Malformed or semantically invalid inbound messages
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Invalid payload for {kind}: {reason}")]
    InvalidPayload { kind: String, reason: String },

    #[error("Message {kind} is missing senderId")]
    MissingSender { kind: String },

    #[error("No session for sender {0}")]
    UnknownSender(String),
}

/// Failure while negotiating with a single peer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NegotiationError {
    #[error("Peer connection creation failed: {0}")]
    ConnectionFailed(String),

    #[error("SDP error: {0}")]
    Sdp(String),

    #[error("ICE error: {0}")]
    Ice(String),

    /// Candidate arrived before any remote description was applied
    #[error("Remote description not set")]
    RemoteDescriptionMissing,

    #[error("Track error: {0}")]
    Track(String),

    #[error("Session limit reached ({0})")]
    SessionLimit(usize),

    #[error("Session closed")]
    Closed,
}

impl NegotiationError {
    /// Races that are expected during trickle ICE and need no teardown
    pub fn is_benign(&self) -> bool {
        matches!(self, NegotiationError::RemoteDescriptionMissing)
    }
}

/// Local capture failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("Failed to acquire local media: {0}")]
    Acquire(String),

    #[error("No local tracks available")]
    NoTracks,
}

impl Error {
    /// Only media and configuration failures are reported to the owning caller
    pub fn is_fatal_to_caller(&self) -> bool {
        matches!(self, Error::Media(_) | Error::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::from(ProtocolError::UnknownType("hello".to_string()));
        assert_eq!(err.to_string(), "Unknown message type: hello");
        assert!(matches!(err, Error::Protocol(ProtocolError::UnknownType(_))));
    }

    #[test]
    fn test_benign_candidate_race() {
        assert!(NegotiationError::RemoteDescriptionMissing.is_benign());
        assert!(!NegotiationError::Ice("bad candidate".to_string()).is_benign());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(Error::from(MediaError::NoTracks).is_fatal_to_caller());
        assert!(!Error::from(TransportError::Send("eof".to_string())).is_fatal_to_caller());
    }

    #[test]
    fn test_transport_retryable() {
        assert!(TransportError::Connection("reset".to_string()).is_retryable());
        assert!(!TransportError::Encode("bad".to_string()).is_retryable());
    }
}
