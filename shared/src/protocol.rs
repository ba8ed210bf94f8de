//! Envelope framing and the JSON codec

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::unix_timestamp;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("datagram is not valid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("unknown message kind 0x{0:02x}")]
    UnknownKind(u8),
}

/// Kind of an envelope. The discriminants are the wire codes.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum MessageKind {
    Connect = 0x01,
    ConnectResponse = 0x02,
    Disconnect = 0x03,

    PlayerJoin = 0x10,
    PlayerLeave = 0x11,

    TransformUpdate = 0x20,
    TransformSync = 0x21,

    RpcCall = 0x30,
    RpcCallResponse = 0x31,

    Heartbeat = 0x40,
    Echo = 0x41,
}

impl MessageKind {
    pub const ALL: [MessageKind; 11] = [
        MessageKind::Connect,
        MessageKind::ConnectResponse,
        MessageKind::Disconnect,
        MessageKind::PlayerJoin,
        MessageKind::PlayerLeave,
        MessageKind::TransformUpdate,
        MessageKind::TransformSync,
        MessageKind::RpcCall,
        MessageKind::RpcCallResponse,
        MessageKind::Heartbeat,
        MessageKind::Echo,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<MessageKind> for u8 {
    fn from(kind: MessageKind) -> u8 {
        kind.code()
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        MessageKind::ALL
            .into_iter()
            .find(|kind| kind.code() == code)
            .ok_or(ProtocolError::UnknownKind(code))
    }
}

/// The unit exchanged over the wire
///
/// `payload` is the kind-specific body, already encoded as JSON text. The
/// codec never looks inside it; [`crate::Message`] does.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Envelope {
    #[serde(rename = "Type")]
    pub kind: MessageKind,
    #[serde(rename = "PlayerId")]
    pub sender_id: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: i64,
    #[serde(rename = "Data")]
    pub payload: String,
}

impl Envelope {
    /// Builds an envelope stamped with the current time
    pub fn new(
        kind: MessageKind,
        sender_id: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            sender_id: sender_id.into(),
            timestamp: unix_timestamp(),
            payload: payload.into(),
        }
    }
}

pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(envelope)?)
}

pub fn decode(bytes: &[u8]) -> Result<Envelope, ProtocolError> {
    let text = std::str::from_utf8(bytes)?;
    Ok(serde_json::from_str(text)?)
}
