//! Wire protocol shared by the session server and its clients
//!
//! Every datagram carries one [`Envelope`]: a message kind, the sender's
//! player id, a timestamp in unix seconds and a payload that is itself an
//! independently encoded JSON document. [`Message`] pairs each kind with its
//! payload type so both sides can match on it exhaustively.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

mod message;
mod protocol;

pub use message::{ConnectRequest, ConnectResponse, Message, PlayerData, TransformData};
pub use protocol::{decode, encode, Envelope, MessageKind, ProtocolError};

pub const DEFAULT_PORT: u16 = 9999;
pub const BUFFER_SIZE: usize = 1024;

/// Sender id used by the server for replies that are not tied to a session
pub const SERVER_SENDER_ID: &str = "SERVER";
pub const ECHO_PREFIX: &str = "ECHO:";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Current time in whole seconds since the unix epoch
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs() as i64
}
