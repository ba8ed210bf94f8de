use log::{debug, info};
use shared::{
    decode, encode, ConnectRequest, ConnectResponse, Message, MessageKind, ProtocolError,
};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid server address: {0}")]
    Address(#[from] std::net::AddrParseError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("no {0:?} reply within {1:?}")]
    Timeout(MessageKind, Duration),
    #[error("unexpected {0:?} from server")]
    Unexpected(MessageKind),
}

/// Scripted client that speaks the server's wire protocol
pub struct TestClient {
    socket: UdpSocket,
    server_addr: SocketAddr,
    player_name: String,
    player_id: Option<String>,
    reply_timeout: Duration,
    /// Messages that arrived while waiting for a different kind
    inbox: VecDeque<Message>,
}

impl TestClient {
    pub async fn new(server_addr: &str, player_name: &str) -> Result<Self, ClientError> {
        let server_addr: SocketAddr = server_addr.parse()?;
        let bind_addr = if server_addr.ip().is_loopback() {
            "127.0.0.1:0"
        } else {
            "0.0.0.0:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        debug!("{} bound to {}", player_name, socket.local_addr()?);

        Ok(TestClient {
            socket,
            server_addr,
            player_name: player_name.to_string(),
            player_id: None,
            reply_timeout: Duration::from_secs(2),
            inbox: VecDeque::new(),
        })
    }

    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    pub fn player_id(&self) -> Option<&str> {
        self.player_id.as_deref()
    }

    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ClientError> {
        Ok(self.socket.local_addr()?)
    }

    /// Sends a message under this client's player id (empty before connecting)
    pub async fn send_message(&self, message: Message) -> Result<(), ClientError> {
        let envelope = message.into_envelope(self.player_id.clone().unwrap_or_default())?;
        self.send_raw(&encode(&envelope)?).await
    }

    pub async fn send_raw(&self, bytes: &[u8]) -> Result<(), ClientError> {
        self.socket.send_to(bytes, self.server_addr).await?;
        Ok(())
    }

    /// Next message from the server, or `None` if nothing arrives in time
    pub async fn recv_message(
        &mut self,
        wait: Duration,
    ) -> Result<Option<Message>, ClientError> {
        if let Some(message) = self.inbox.pop_front() {
            return Ok(Some(message));
        }

        let mut buf = [0u8; shared::BUFFER_SIZE];
        match timeout(wait, self.socket.recv_from(&mut buf)).await {
            Ok(received) => {
                let (len, _) = received?;
                let envelope = decode(&buf[..len])?;
                Ok(Some(Message::from_envelope(&envelope)?))
            }
            Err(_) => Ok(None),
        }
    }

    /// Waits for a message of `kind`, keeping anything else for later reads
    async fn wait_for(&mut self, kind: MessageKind) -> Result<Message, ClientError> {
        if let Some(pos) = self.inbox.iter().position(|m| m.kind() == kind) {
            if let Some(message) = self.inbox.remove(pos) {
                return Ok(message);
            }
        }

        let deadline = Instant::now() + self.reply_timeout;
        let mut buf = [0u8; shared::BUFFER_SIZE];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let (len, _) = timeout(remaining, self.socket.recv_from(&mut buf))
                .await
                .map_err(|_| ClientError::Timeout(kind, self.reply_timeout))??;

            let message = Message::from_envelope(&decode(&buf[..len])?)?;
            if message.kind() == kind {
                return Ok(message);
            }

            debug!(
                "{} holding {:?} while waiting for {:?}",
                self.player_name,
                message.kind(),
                kind
            );
            self.inbox.push_back(message);
        }
    }

    /// Registers with the server and remembers the assigned id on success
    pub async fn connect(&mut self) -> Result<ConnectResponse, ClientError> {
        info!("[{}] Connecting to {}", self.player_name, self.server_addr);

        self.send_message(Message::Connect(ConnectRequest {
            player_name: self.player_name.clone(),
        }))
        .await?;

        let response = match self.wait_for(MessageKind::ConnectResponse).await? {
            Message::ConnectResponse(response) => response,
            other => return Err(ClientError::Unexpected(other.kind())),
        };

        if response.success {
            info!(
                "[{}] Connected as {}: {}",
                self.player_name, response.player_id, response.message
            );
            self.player_id = Some(response.player_id.clone());
        } else {
            info!("[{}] Connect refused: {}", self.player_name, response.message);
        }

        Ok(response)
    }

    /// Sends `text` as an Echo and returns the server's reply text
    pub async fn echo(&mut self, text: &str) -> Result<String, ClientError> {
        self.send_message(Message::Echo(text.to_string())).await?;

        match self.wait_for(MessageKind::Echo).await? {
            Message::Echo(reply) => {
                info!("[{}] {}", self.player_name, reply);
                Ok(reply)
            }
            other => Err(ClientError::Unexpected(other.kind())),
        }
    }

    /// Tells the server this client is leaving. Fire-and-forget.
    pub async fn disconnect(&mut self, reason: &str) -> Result<(), ClientError> {
        info!("[{}] Disconnecting", self.player_name);
        self.send_message(Message::Disconnect(reason.to_string())).await?;
        self.player_id = None;
        Ok(())
    }
}
