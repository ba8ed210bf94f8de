//! Client session tracking for the session server
//!
//! This module owns every connected player's session and answers the two
//! questions the dispatch path keeps asking: "who is behind this address?"
//! and "who should receive this broadcast?". Sessions are indexed twice, by
//! player id and by network address. Both indexes live in one structure
//! behind a single lock, so a reader can never see a session in one index
//! and not the other.
//!
//! Player ids come from a counter that is separate from the session lock.
//! Ids are handed out as `Player_1`, `Player_2`, ... and never reused.

use log::info;
use shared::{unix_timestamp, PlayerData, Vector3};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Server-side record of a connected client
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Identifier assigned by the server on first connect
    pub player_id: String,
    /// Display name supplied by the client
    pub player_name: String,
    /// Address replies and broadcasts are sent to
    pub addr: SocketAddr,
    /// Unix seconds of the last heartbeat (the connect time until heartbeats are handled)
    pub last_heartbeat: i64,
    pub position: Vector3,
    pub rotation: Vector3,
}

impl Session {
    /// Creates a session at the origin with a fresh heartbeat
    pub fn new(player_id: String, player_name: String, addr: SocketAddr) -> Self {
        Self {
            player_id,
            player_name,
            addr,
            last_heartbeat: unix_timestamp(),
            position: Vector3::ZERO,
            rotation: Vector3::ZERO,
        }
    }

    /// Describes this player for other clients
    pub fn to_player_data(&self) -> PlayerData {
        PlayerData {
            player_id: self.player_id.clone(),
            player_name: self.player_name.clone(),
            position: self.position,
            rotation: self.rotation,
            last_update: self.last_heartbeat,
        }
    }
}

/// Result of a connect attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new session was created with this id
    Created(String),
    /// The address already had a session; nothing was created
    AlreadyConnected(String),
}

impl ConnectOutcome {
    pub fn player_id(&self) -> &str {
        match self {
            ConnectOutcome::Created(id) | ConnectOutcome::AlreadyConnected(id) => id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, ConnectOutcome::Created(_))
    }
}

/// Both session indexes. Only ever modified as a unit.
#[derive(Debug, Default)]
struct Sessions {
    by_id: HashMap<String, Session>,
    by_addr: HashMap<SocketAddr, String>,
}

impl Sessions {
    fn insert(&mut self, session: Session) {
        self.by_addr.insert(session.addr, session.player_id.clone());
        self.by_id.insert(session.player_id.clone(), session);
    }

    fn remove_by_addr(&mut self, addr: &SocketAddr) -> Option<Session> {
        let player_id = self.by_addr.remove(addr)?;
        self.by_id.remove(&player_id)
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        self.by_id.len() == self.by_addr.len()
            && self.by_addr.iter().all(|(addr, id)| {
                self.by_id
                    .get(id)
                    .is_some_and(|session| session.addr == *addr)
            })
    }
}

/// Registry of all connected sessions
///
/// Safe to share between the receive pipeline and concurrent broadcast
/// sends; every method takes `&self`.
pub struct ClientManager {
    sessions: RwLock<Sessions>,
    /// Next numeric suffix for `Player_<n>`
    next_player_id: AtomicU64,
}

impl ClientManager {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(Sessions::default()),
            next_player_id: AtomicU64::new(1),
        }
    }

    fn allocate_player_id(&self) -> String {
        let n = self.next_player_id.fetch_add(1, Ordering::Relaxed);
        format!("Player_{}", n)
    }

    /// Registers a session for `addr`
    ///
    /// Replaying a connect from an address that already has a session returns
    /// the existing id instead of creating a second session.
    pub async fn connect(&self, addr: SocketAddr, player_name: &str) -> ConnectOutcome {
        let mut sessions = self.sessions.write().await;

        if let Some(existing) = sessions.by_addr.get(&addr) {
            info!("Client {} already connected as {}", addr, existing);
            return ConnectOutcome::AlreadyConnected(existing.clone());
        }

        let player_id = self.allocate_player_id();
        sessions.insert(Session::new(
            player_id.clone(),
            player_name.to_string(),
            addr,
        ));

        info!("Player {} ({}) connected from {}", player_id, player_name, addr);
        ConnectOutcome::Created(player_id)
    }

    /// Removes and returns the session for `addr`, if any
    pub async fn disconnect(&self, addr: SocketAddr) -> Option<Session> {
        let removed = self.sessions.write().await.remove_by_addr(&addr);

        if let Some(session) = &removed {
            info!(
                "Player {} ({}) disconnected from {}",
                session.player_id, session.player_name, addr
            );
        }

        removed
    }

    /// Point-in-time copy of every session
    pub async fn snapshot(&self) -> Vec<Session> {
        self.sessions.read().await.by_id.values().cloned().collect()
    }

    pub async fn find_player_id(&self, addr: SocketAddr) -> Option<String> {
        self.sessions.read().await.by_addr.get(&addr).cloned()
    }

    pub async fn get(&self, player_id: &str) -> Option<Session> {
        self.sessions.read().await.by_id.get(player_id).cloned()
    }

    /// Returns the number of connected sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}
