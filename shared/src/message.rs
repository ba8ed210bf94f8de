//! Typed payloads and the [`Message`] tagged union

use serde::{Deserialize, Serialize};

use crate::protocol::{Envelope, MessageKind, ProtocolError};
use crate::Vector3;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ConnectRequest {
    pub player_name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ConnectResponse {
    pub success: bool,
    pub player_id: String,
    pub message: String,
}

/// Last known state of a player, as announced to other clients
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PlayerData {
    pub player_id: String,
    pub player_name: String,
    pub position: Vector3,
    pub rotation: Vector3,
    pub last_update: i64,
}

/// Body of a `TransformUpdate` or `TransformSync` message
///
/// The `Message` variants for those kinds keep raw text; handlers that act on
/// transforms parse it with [`TransformData::parse`].
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct TransformData {
    pub position: Vector3,
    pub rotation: Vector3,
    /// Seconds since the sender's previous update
    pub delta_time: f32,
}

impl TransformData {
    pub fn parse(payload: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn to_payload(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A message kind paired with its decoded payload
///
/// Kinds without a handler yet keep their payload as raw JSON text, so
/// turning any well-formed envelope into a `Message` cannot fail on them.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Connect(ConnectRequest),
    ConnectResponse(ConnectResponse),
    Disconnect(String),
    PlayerJoin(String),
    PlayerLeave(PlayerData),
    TransformUpdate(String),
    TransformSync(String),
    RpcCall(String),
    RpcCallResponse(String),
    Heartbeat(String),
    Echo(String),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Connect(_) => MessageKind::Connect,
            Message::ConnectResponse(_) => MessageKind::ConnectResponse,
            Message::Disconnect(_) => MessageKind::Disconnect,
            Message::PlayerJoin(_) => MessageKind::PlayerJoin,
            Message::PlayerLeave(_) => MessageKind::PlayerLeave,
            Message::TransformUpdate(_) => MessageKind::TransformUpdate,
            Message::TransformSync(_) => MessageKind::TransformSync,
            Message::RpcCall(_) => MessageKind::RpcCall,
            Message::RpcCallResponse(_) => MessageKind::RpcCallResponse,
            Message::Heartbeat(_) => MessageKind::Heartbeat,
            Message::Echo(_) => MessageKind::Echo,
        }
    }

    /// Serializes the payload and wraps it in an envelope stamped now
    pub fn into_envelope(self, sender_id: impl Into<String>) -> Result<Envelope, ProtocolError> {
        let kind = self.kind();
        let payload = match self {
            Message::Connect(request) => serde_json::to_string(&request)?,
            Message::ConnectResponse(response) => serde_json::to_string(&response)?,
            Message::PlayerLeave(player) => serde_json::to_string(&player)?,
            Message::Disconnect(text) | Message::Echo(text) => serde_json::to_string(&text)?,
            Message::PlayerJoin(raw)
            | Message::TransformUpdate(raw)
            | Message::TransformSync(raw)
            | Message::RpcCall(raw)
            | Message::RpcCallResponse(raw)
            | Message::Heartbeat(raw) => raw,
        };

        Ok(Envelope::new(kind, sender_id, payload))
    }

    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        let data = envelope.payload.as_str();
        let message = match envelope.kind {
            MessageKind::Connect => Message::Connect(serde_json::from_str(data)?),
            MessageKind::ConnectResponse => Message::ConnectResponse(serde_json::from_str(data)?),
            MessageKind::Disconnect => Message::Disconnect(serde_json::from_str(data)?),
            MessageKind::PlayerLeave => Message::PlayerLeave(serde_json::from_str(data)?),
            MessageKind::Echo => Message::Echo(serde_json::from_str(data)?),
            MessageKind::PlayerJoin => Message::PlayerJoin(data.to_owned()),
            MessageKind::TransformUpdate => Message::TransformUpdate(data.to_owned()),
            MessageKind::TransformSync => Message::TransformSync(data.to_owned()),
            MessageKind::RpcCall => Message::RpcCall(data.to_owned()),
            MessageKind::RpcCallResponse => Message::RpcCallResponse(data.to_owned()),
            MessageKind::Heartbeat => Message::Heartbeat(data.to_owned()),
        };

        Ok(message)
    }
}
