//! Routes decoded envelopes to their handlers

use crate::broadcast::broadcast;
use crate::client_manager::{ClientManager, ConnectOutcome};
use crate::error::ServerError;
use crate::network::ReceivedDatagram;
use log::{debug, info, warn};
use shared::{
    decode, encode, ConnectRequest, ConnectResponse, Envelope, Message, ECHO_PREFIX,
    SERVER_SENDER_ID,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Handler state shared by every datagram: the socket replies go out on and
/// the session registry
#[derive(Clone)]
pub struct Dispatcher {
    socket: Arc<UdpSocket>,
    clients: Arc<ClientManager>,
}

impl Dispatcher {
    pub fn new(socket: Arc<UdpSocket>, clients: Arc<ClientManager>) -> Self {
        Self { socket, clients }
    }

    /// Decodes and handles one datagram
    ///
    /// Takes ownership of the datagram so its buffer goes back to the pool
    /// exactly once, right after decoding and before any handler runs.
    /// Failures are logged here and never reach the dispatch loop.
    pub async fn dispatch(&self, datagram: ReceivedDatagram) {
        let addr = datagram.addr();
        let decoded = decode(datagram.bytes());
        datagram.release();

        let envelope = match decoded {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping malformed datagram from {}: {}", addr, e);
                return;
            }
        };

        debug!(
            "Received {:?} from {} (sender '{}')",
            envelope.kind, addr, envelope.sender_id
        );

        if let Err(e) = self.handle_envelope(&envelope, addr).await {
            warn!("Failed to handle {:?} from {}: {}", envelope.kind, addr, e);
        }
    }

    async fn handle_envelope(
        &self,
        envelope: &Envelope,
        addr: SocketAddr,
    ) -> Result<(), ServerError> {
        match Message::from_envelope(envelope)? {
            Message::Connect(request) => self.handle_connect(request, addr).await,
            Message::Disconnect(reason) => self.handle_disconnect(&reason, addr).await,
            Message::Echo(text) => self.handle_echo(&text, addr).await,
            Message::ConnectResponse(_)
            | Message::PlayerJoin(_)
            | Message::PlayerLeave(_)
            | Message::TransformUpdate(_)
            | Message::TransformSync(_)
            | Message::RpcCall(_)
            | Message::RpcCallResponse(_)
            | Message::Heartbeat(_) => {
                debug!("No handler for {:?} from {}, ignoring", envelope.kind, addr);
                Ok(())
            }
        }
    }

    async fn handle_connect(
        &self,
        request: ConnectRequest,
        addr: SocketAddr,
    ) -> Result<(), ServerError> {
        info!("Client connecting from {} as '{}'", addr, request.player_name);

        let outcome = self.clients.connect(addr, &request.player_name).await;
        let response = match &outcome {
            ConnectOutcome::Created(player_id) => ConnectResponse {
                success: true,
                player_id: player_id.clone(),
                message: format!("Connected: {}", request.player_name),
            },
            ConnectOutcome::AlreadyConnected(player_id) => ConnectResponse {
                success: false,
                player_id: player_id.clone(),
                message: "Client already connected".to_string(),
            },
        };

        let reply = Message::ConnectResponse(response).into_envelope(outcome.player_id())?;
        self.send_envelope(&reply, addr).await
    }

    async fn handle_disconnect(&self, reason: &str, addr: SocketAddr) -> Result<(), ServerError> {
        let Some(session) = self.clients.disconnect(addr).await else {
            warn!("Disconnect from unknown client {} ({})", addr, reason);
            return Ok(());
        };

        info!("Player {} left: {}", session.player_id, reason);

        let notice =
            Message::PlayerLeave(session.to_player_data()).into_envelope(&session.player_id)?;
        let report =
            broadcast(&self.socket, &self.clients, &notice, Some(&session.player_id)).await?;
        debug!(
            "PlayerLeave for {} reached {}/{} clients",
            session.player_id,
            report.delivered,
            report.attempted()
        );

        Ok(())
    }

    async fn handle_echo(&self, text: &str, addr: SocketAddr) -> Result<(), ServerError> {
        let reply =
            Message::Echo(format!("{}{}", ECHO_PREFIX, text)).into_envelope(SERVER_SENDER_ID)?;
        self.send_envelope(&reply, addr).await
    }

    async fn send_envelope(
        &self,
        envelope: &Envelope,
        addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let data = encode(envelope)?;
        self.socket.send_to(&data, addr).await?;
        Ok(())
    }
}
