//! # Session Server Library
//!
//! This library provides a connectionless, session-tracking message server
//! over UDP. Clients register, exchange typed messages and leave; the server
//! keeps per-client session state and tolerates lost or reordered datagrams.
//!
//! ## Core Responsibilities
//!
//! ### Datagram Pipeline
//! Two long-lived tasks share the work. The receive loop pulls datagrams off
//! the socket into pooled buffers and queues them; the dispatch loop drains
//! the queue in arrival order, decodes each envelope and runs its handler.
//! Neither loop ever blocks the other.
//!
//! ### Session Management
//! Tracks every connected client by player id and by network address:
//! - Sequential `Player_<n>` ids that are never reused
//! - Idempotent connects (a replayed connect returns the existing id)
//! - Removal on explicit disconnect, announced to the remaining players
//!
//! ### Fan-out
//! Broadcasts go to a snapshot of the sessions, one concurrent send per
//! recipient, optionally skipping one player.
//!
//! ## Module Organization
//!
//! ### Buffer Pool (`buffer_pool`)
//! Fixed-size receive buffers handed out as move-only handles that return
//! themselves to the pool when dropped.
//!
//! ### Client Manager (`client_manager`)
//! The session registry. Both indexes are updated under one lock so no reader
//! sees half a session.
//!
//! ### Dispatcher (`dispatcher`)
//! Decodes envelopes and routes them: `Connect`, `Disconnect` and `Echo` have
//! handlers, every other kind is a logged no-op.
//!
//! ### Broadcast (`broadcast`)
//! Concurrent send to all sessions with per-recipient failure accounting.
//!
//! ### Network (`network`)
//! Socket binding, the receive and dispatch loops, and graceful shutdown.
//!
//! ## Failure Model
//!
//! Nothing after startup is fatal. Receive errors are logged and retried after
//! a short pause, malformed datagrams are dropped, handler and send failures
//! are logged. Only a failed bind is reported to the caller.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Bind 0.0.0.0:9999 and start both loops
//!     let server = Server::start(ServerConfig::default()).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!
//!     // Signal the loops, wait for the grace period, close the socket
//!     server.stop().await;
//!
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod buffer_pool;
pub mod client_manager;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod network;
