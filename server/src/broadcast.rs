//! Concurrent fan-out of one envelope to every connected session

use crate::client_manager::ClientManager;
use crate::error::ServerError;
use log::{debug, error};
use shared::{encode, Envelope};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinSet;

/// Per-recipient outcome counts of a single broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

impl BroadcastReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Sends `envelope` to every session except `exclude_id`
///
/// The envelope is encoded once, then one send task per recipient runs on
/// a `JoinSet`. Returns once every send has finished. A failed send is
/// logged and counted; it neither stops the others nor gets retried.
pub async fn broadcast(
    socket: &Arc<UdpSocket>,
    clients: &ClientManager,
    envelope: &Envelope,
    exclude_id: Option<&str>,
) -> Result<BroadcastReport, ServerError> {
    let bytes: Arc<[u8]> = encode(envelope)?.into();
    let recipients = clients.snapshot().await;

    let mut sends = JoinSet::new();
    for session in recipients {
        if Some(session.player_id.as_str()) == exclude_id {
            continue;
        }

        let socket = Arc::clone(socket);
        let bytes = Arc::clone(&bytes);
        sends.spawn(async move {
            let result = socket.send_to(&bytes, session.addr).await;
            (session.player_id, session.addr, result)
        });
    }

    let mut report = BroadcastReport::default();
    while let Some(joined) = sends.join_next().await {
        match joined {
            Ok((_, _, Ok(_))) => report.delivered += 1,
            Ok((player_id, addr, Err(e))) => {
                error!(
                    "Failed to send {:?} to {} at {}: {}",
                    envelope.kind, player_id, addr, e
                );
                report.failed += 1;
            }
            Err(e) => {
                error!("Broadcast send task failed: {}", e);
                report.failed += 1;
            }
        }
    }

    debug!(
        "Broadcast {:?}: {} delivered, {} failed",
        envelope.kind, report.delivered, report.failed
    );

    Ok(report)
}
