//! # Test Client Library
//!
//! A scripted client for exercising the session server over real UDP. It
//! speaks the same envelope protocol as any other peer and exposes the
//! handful of operations a test or a smoke run needs: connect, echo,
//! disconnect and "read whatever the server sent".
//!
//! Replies are matched by message kind. Anything else that arrives while a
//! reply is awaited (for example a `PlayerLeave` broadcast) is kept and
//! handed out by the next [`network::TestClient::recv_message`] call, so
//! broadcasts are never lost to a request/response exchange.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::TestClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = TestClient::new("127.0.0.1:9999", "TestPlayer1").await?;
//!
//!     let response = client.connect().await?;
//!     println!("assigned {}", response.player_id);
//!
//!     assert_eq!(client.echo("PING").await?, "ECHO:PING");
//!
//!     client.disconnect("done").await?;
//!     Ok(())
//! }
//! ```

pub mod network;
