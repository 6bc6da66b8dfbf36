//! Room signaling protocol
//!
//! Every frame on the control connection is a JSON object
//! `{ "type", "senderId", "targetUserId"?, "data" }`. The envelope is parsed
//! first and `data` is then decoded according to `type`, so a bad payload is
//! reported against the message kind that carried it.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Opaque participant identifier assigned by the room backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Offer or answer, in the browser `RTCSessionDescriptionInit` shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self { kind: SdpKind::Offer, sdp: sdp.into() }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self { kind: SdpKind::Answer, sdp: sdp.into() }
    }
}

/// ICE candidate, in the browser `RTCIceCandidateInit` shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "usernameFragment", default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// Closed set of message types carried by the room protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    JoinRoom,
    YourInfo,
    UserConnected,
    UserDisconnected,
    VideoOffer,
    VideoAnswer,
    IceCandidate,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::JoinRoom => "join-room",
            MessageType::YourInfo => "your_info",
            MessageType::UserConnected => "user_connected",
            MessageType::UserDisconnected => "user_disconnected",
            MessageType::VideoOffer => "video_offer",
            MessageType::VideoAnswer => "video_answer",
            MessageType::IceCandidate => "ice_candidate",
        }
    }

    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "join-room" => Some(MessageType::JoinRoom),
            "your_info" => Some(MessageType::YourInfo),
            "user_connected" => Some(MessageType::UserConnected),
            "user_disconnected" => Some(MessageType::UserDisconnected),
            "video_offer" => Some(MessageType::VideoOffer),
            "video_answer" => Some(MessageType::VideoAnswer),
            "ice_candidate" => Some(MessageType::IceCandidate),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific payload of a signaling message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    JoinRoom { room_id: String },
    YourInfo { user_id: ParticipantId },
    UserConnected,
    UserDisconnected,
    VideoOffer { offer: SessionDescription },
    VideoAnswer { answer: SessionDescription },
    IceCandidate { candidate: IceCandidate },
}

impl MessageBody {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageBody::JoinRoom { .. } => MessageType::JoinRoom,
            MessageBody::YourInfo { .. } => MessageType::YourInfo,
            MessageBody::UserConnected => MessageType::UserConnected,
            MessageBody::UserDisconnected => MessageType::UserDisconnected,
            MessageBody::VideoOffer { .. } => MessageType::VideoOffer,
            MessageBody::VideoAnswer { .. } => MessageType::VideoAnswer,
            MessageBody::IceCandidate { .. } => MessageType::IceCandidate,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinRoomData {
    room_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YourInfoData {
    user_id: ParticipantId,
}

#[derive(Debug, Serialize, Deserialize)]
struct OfferData {
    offer: SessionDescription,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnswerData {
    answer: SessionDescription,
}

#[derive(Debug, Serialize, Deserialize)]
struct CandidateData {
    candidate: IceCandidate,
}

/// Raw frame as it appears on the wire
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "senderId", default, skip_serializing_if = "Option::is_none")]
    sender_id: Option<ParticipantId>,
    #[serde(rename = "targetUserId", default, skip_serializing_if = "Option::is_none")]
    target_user_id: Option<ParticipantId>,
    #[serde(default)]
    data: Value,
}

/// One message of the room protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingMessage {
    pub sender_id: Option<ParticipantId>,
    pub target_user_id: Option<ParticipantId>,
    pub body: MessageBody,
}

impl SignalingMessage {
    pub fn new(body: MessageBody) -> Self {
        Self { sender_id: None, target_user_id: None, body }
    }

    /// Room join announcement sent right after the connection opens
    pub fn join_room(room_id: impl Into<String>) -> Self {
        Self::new(MessageBody::JoinRoom { room_id: room_id.into() })
    }

    pub fn video_offer(target: ParticipantId, offer: SessionDescription) -> Self {
        Self::new(MessageBody::VideoOffer { offer }).targeted(target)
    }

    pub fn video_answer(target: ParticipantId, answer: SessionDescription) -> Self {
        Self::new(MessageBody::VideoAnswer { answer }).targeted(target)
    }

    pub fn ice_candidate(target: ParticipantId, candidate: IceCandidate) -> Self {
        Self::new(MessageBody::IceCandidate { candidate }).targeted(target)
    }

    pub fn targeted(mut self, target: ParticipantId) -> Self {
        self.target_user_id = Some(target);
        self
    }

    pub fn from_sender(mut self, sender: ParticipantId) -> Self {
        self.sender_id = Some(sender);
        self
    }

    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }

    /// Parse a signaling message from a JSON text frame
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(json.trim())
            .map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

        let kind = MessageType::parse(&envelope.kind)
            .ok_or_else(|| ProtocolError::UnknownType(envelope.kind.clone()))?;

        let body = match kind {
            MessageType::JoinRoom => {
                let data: JoinRoomData = decode_data(kind, envelope.data)?;
                MessageBody::JoinRoom { room_id: data.room_id }
            }
            MessageType::YourInfo => {
                let data: YourInfoData = decode_data(kind, envelope.data)?;
                MessageBody::YourInfo { user_id: data.user_id }
            }
            MessageType::UserConnected => MessageBody::UserConnected,
            MessageType::UserDisconnected => MessageBody::UserDisconnected,
            MessageType::VideoOffer => {
                let data: OfferData = decode_data(kind, envelope.data)?;
                MessageBody::VideoOffer { offer: data.offer }
            }
            MessageType::VideoAnswer => {
                let data: AnswerData = decode_data(kind, envelope.data)?;
                MessageBody::VideoAnswer { answer: data.answer }
            }
            MessageType::IceCandidate => {
                let data: CandidateData = decode_data(kind, envelope.data)?;
                MessageBody::IceCandidate { candidate: data.candidate }
            }
        };

        Ok(Self {
            sender_id: envelope.sender_id,
            target_user_id: envelope.target_user_id,
            body,
        })
    }

    /// Serialize to a JSON text frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let data = match &self.body {
            MessageBody::JoinRoom { room_id } => {
                serde_json::to_value(JoinRoomData { room_id: room_id.clone() })?
            }
            MessageBody::YourInfo { user_id } => {
                serde_json::to_value(YourInfoData { user_id: user_id.clone() })?
            }
            MessageBody::UserConnected | MessageBody::UserDisconnected => {
                Value::Object(Default::default())
            }
            MessageBody::VideoOffer { offer } => {
                serde_json::to_value(OfferData { offer: offer.clone() })?
            }
            MessageBody::VideoAnswer { answer } => {
                serde_json::to_value(AnswerData { answer: answer.clone() })?
            }
            MessageBody::IceCandidate { candidate } => {
                serde_json::to_value(CandidateData { candidate: candidate.clone() })?
            }
        };

        serde_json::to_string(&Envelope {
            kind: self.message_type().as_str().to_string(),
            sender_id: self.sender_id.clone(),
            target_user_id: self.target_user_id.clone(),
            data,
        })
    }
}

fn decode_data<T: serde::de::DeserializeOwned>(
    kind: MessageType,
    data: Value,
) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|e| ProtocolError::InvalidPayload {
        kind: kind.as_str().to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_your_info() {
        let json = r#"{"type": "your_info", "data": {"userId": "A"}}"#;
        let msg = SignalingMessage::from_json(json).unwrap();
        assert_eq!(msg.sender_id, None);
        assert_eq!(msg.body, MessageBody::YourInfo { user_id: "A".into() });
    }

    #[test]
    fn test_parse_user_connected_without_data() {
        let json = r#"{"type": "user_connected", "senderId": "B"}"#;
        let msg = SignalingMessage::from_json(json).unwrap();
        assert_eq!(msg.sender_id, Some("B".into()));
        assert_eq!(msg.body, MessageBody::UserConnected);
    }

    #[test]
    fn test_parse_offer() {
        let json = r#"{
            "type": "video_offer",
            "senderId": "B",
            "targetUserId": "A",
            "data": {"offer": {"type": "offer", "sdp": "v=0\r\n..."}}
        }"#;
        let msg = SignalingMessage::from_json(json).unwrap();
        assert_eq!(msg.target_user_id, Some("A".into()));
        match msg.body {
            MessageBody::VideoOffer { offer } => {
                assert_eq!(offer.kind, SdpKind::Offer);
                assert!(offer.sdp.starts_with("v=0"));
            }
            other => panic!("Expected VideoOffer, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_browser_candidate() {
        let json = r#"{"type": "ice_candidate", "senderId": "B", "data": {"candidate":
            {"candidate": "candidate:1 1 udp 2122260223 10.0.0.2 54400 typ host",
             "sdpMid": "0", "sdpMLineIndex": 0, "usernameFragment": null}}}"#;
        let msg = SignalingMessage::from_json(json).unwrap();
        match msg.body {
            MessageBody::IceCandidate { candidate } => {
                assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
                assert_eq!(candidate.sdp_mline_index, Some(0));
                assert_eq!(candidate.username_fragment, None);
            }
            other => panic!("Expected IceCandidate, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = SignalingMessage::from_json(r#"{"type": "chat", "data": {}}"#).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownType("chat".to_string()));
    }

    #[test]
    fn test_missing_payload_field_rejected() {
        let err = SignalingMessage::from_json(r#"{"type": "video_answer", "senderId": "B", "data": {}}"#)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { ref kind, .. } if kind == "video_answer"));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            SignalingMessage::from_json("webrtc,offer,v=0"),
            Err(ProtocolError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_join_room_serialization() {
        let json = SignalingMessage::join_room("room-42").to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "join-room");
        assert_eq!(value["data"]["roomId"], "room-42");
        assert!(value.get("senderId").is_none());
    }

    #[test]
    fn test_answer_serialization_is_targeted() {
        let msg = SignalingMessage::video_answer("B".into(), SessionDescription::answer("v=0"))
            .from_sender("A".into());
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "video_answer");
        assert_eq!(value["senderId"], "A");
        assert_eq!(value["targetUserId"], "B");
        assert_eq!(value["data"]["answer"]["type"], "answer");
    }
}
