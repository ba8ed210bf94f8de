//! Server network layer: the receive and dispatch loops and their lifecycle

use crate::buffer_pool::{BufferPool, PooledBuffer};
use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::ServerError;
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

/// A datagram on its way from the receive loop to the dispatch loop
///
/// Owns its pooled buffer. Moving it through the queue hands the buffer
/// over; dropping or releasing it returns the buffer to the pool.
#[derive(Debug)]
pub struct ReceivedDatagram {
    buffer: PooledBuffer,
    len: usize,
    addr: SocketAddr,
}

impl ReceivedDatagram {
    /// Wraps the first `len` bytes of `buffer`
    ///
    /// Returns `None` if `len` does not fit the buffer. The buffer is then
    /// dropped, which returns it to the pool.
    pub fn new(buffer: PooledBuffer, len: usize, addr: SocketAddr) -> Option<Self> {
        if len > buffer.len() {
            return None;
        }
        Some(Self { buffer, len, addr })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    /// Gives the buffer back to the pool
    pub fn release(self) {
        self.buffer.release();
    }
}

/// A running server: bound socket plus the two pipeline tasks
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<ClientManager>,
    pool: BufferPool,
    running: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    receiver: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
    shutdown_grace: Duration,
}

impl Server {
    /// Binds the socket and spawns the receive and dispatch loops
    ///
    /// A bind failure is the only error that reaches the caller; everything
    /// after startup is logged and absorbed by the loops.
    pub async fn start(config: ServerConfig) -> Result<Self, ServerError> {
        let addr = config.bind_addr();
        let socket = UdpSocket::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let socket = Arc::new(socket);
        info!("Server listening on {}", socket.local_addr()?);

        let clients = Arc::new(ClientManager::new());
        let pool = BufferPool::new(config.buffer_size, config.max_pooled_buffers);
        let running = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        let receiver = tokio::spawn(receive_loop(
            Arc::clone(&socket),
            pool.clone(),
            queue_tx,
            shutdown_rx.clone(),
            config.empty_read_backoff,
            config.error_backoff,
        ));

        let dispatcher = tokio::spawn(dispatch_loop(
            Dispatcher::new(Arc::clone(&socket), Arc::clone(&clients)),
            queue_rx,
            shutdown_rx,
            Arc::clone(&running),
        ));

        info!("Server started successfully");

        Ok(Server {
            socket,
            clients,
            pool,
            running,
            shutdown_tx,
            receiver,
            dispatcher,
            shutdown_grace: config.shutdown_grace,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn clients(&self) -> &Arc<ClientManager> {
        &self.clients
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Signals both loops, waits up to the grace period for them, then
    /// aborts whatever is still running and closes the socket
    ///
    /// Datagrams still queued are dropped unprocessed.
    pub async fn stop(mut self) {
        info!("Server shutting down");

        self.running.store(false, Ordering::Release);
        // Both loops may already be gone; nothing to signal then
        let _ = self.shutdown_tx.send(true);

        let joined = timeout(self.shutdown_grace, async {
            let _ = (&mut self.receiver).await;
            let _ = (&mut self.dispatcher).await;
        })
        .await;

        if joined.is_err() {
            warn!(
                "Pipeline did not stop within {:?}, aborting",
                self.shutdown_grace
            );
            self.receiver.abort();
            self.dispatcher.abort();
            let _ = (&mut self.receiver).await;
            let _ = (&mut self.dispatcher).await;
        }

        let stats = self.pool.stats();
        info!(
            "Server stopped ({} sessions dropped, {} buffers rented, {} returned)",
            self.clients.len().await,
            stats.rented,
            stats.returned
        );
    }
}

fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Pulls datagrams off the socket into pooled buffers and queues them
async fn receive_loop(
    socket: Arc<UdpSocket>,
    pool: BufferPool,
    queue: mpsc::UnboundedSender<ReceivedDatagram>,
    mut shutdown: watch::Receiver<bool>,
    empty_read_backoff: Duration,
    error_backoff: Duration,
) {
    loop {
        if shutdown_requested(&shutdown) {
            break;
        }

        let mut buffer = pool.rent(pool.buffer_size());
        let received = tokio::select! {
            _ = shutdown.changed() => break,
            received = socket.recv_from(&mut buffer[..]) => received,
        };

        match received {
            Ok((0, addr)) => {
                debug!("Empty datagram from {}", addr);
                buffer.release();
                sleep(empty_read_backoff).await;
            }
            Ok((len, addr)) => {
                let Some(datagram) = ReceivedDatagram::new(buffer, len, addr) else {
                    warn!("Datagram from {} overran its buffer ({} bytes)", addr, len);
                    continue;
                };
                if queue.send(datagram).is_err() {
                    warn!("Dispatch queue closed, stopping receive loop");
                    break;
                }
            }
            Err(e) => {
                buffer.release();
                warn!("Error receiving datagram: {}", e);
                sleep(error_backoff).await;
            }
        }
    }

    debug!("Receive loop stopped");
}

/// Drains the queue in arrival order, one datagram at a time
async fn dispatch_loop(
    dispatcher: Dispatcher,
    mut queue: mpsc::UnboundedReceiver<ReceivedDatagram>,
    mut shutdown: watch::Receiver<bool>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Acquire) && !shutdown_requested(&shutdown) {
        let datagram = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            datagram = queue.recv() => match datagram {
                Some(datagram) => datagram,
                None => break,
            },
        };

        dispatcher.dispatch(datagram).await;
    }

    // Anything still queued is dropped here, which returns its buffer
    queue.close();
    debug!("Dispatch loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{decode, encode, ConnectRequest, Message};

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            shutdown_grace: Duration::from_millis(200),
            ..Default::default()
        }
    }

    async fn request(socket: &UdpSocket, server: SocketAddr, message: Message) -> Message {
        let bytes = encode(&message.into_envelope("").unwrap()).unwrap();
        socket.send_to(&bytes, server).await.unwrap();

        let mut buf = [0u8; 1024];
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("no reply from server")
            .unwrap();
        Message::from_envelope(&decode(&buf[..len]).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_start_and_echo() {
        let server = Server::start(test_config()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let reply = request(&client, addr, Message::Echo("PING".to_string())).await;
        assert_eq!(reply, Message::Echo("ECHO:PING".to_string()));

        server.stop().await;
    }

    #[tokio::test]
    async fn test_bind_failure_propagates() {
        let first = Server::start(test_config()).await.unwrap();
        let port = first.local_addr().unwrap().port();

        let taken = ServerConfig {
            port,
            ..test_config()
        };
        match Server::start(taken).await {
            Err(ServerError::Bind { addr, .. }) => {
                assert_eq!(addr, format!("127.0.0.1:{}", port))
            }
            Err(other) => panic!("Expected Bind error, got {}", other),
            Ok(_) => panic!("Second bind on the same port should fail"),
        }

        first.stop().await;
    }

    #[tokio::test]
    async fn test_datagrams_processed_in_arrival_order() {
        let server = Server::start(test_config()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        for i in 0..20 {
            let envelope = Message::Echo(i.to_string()).into_envelope("").unwrap();
            let bytes = encode(&envelope).unwrap();
            client.send_to(&bytes, addr).await.unwrap();
        }

        let mut buf = [0u8; 1024];
        for i in 0..20 {
            let (len, _) = timeout(Duration::from_secs(2), client.recv_from(&mut buf))
                .await
                .unwrap()
                .unwrap();
            let reply = Message::from_envelope(&decode(&buf[..len]).unwrap()).unwrap();
            assert_eq!(reply, Message::Echo(format!("ECHO:{}", i)));
        }

        server.stop().await;
    }

    #[tokio::test]
    async fn test_stop_returns_every_buffer() {
        let server = Server::start(test_config()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let connect = Message::Connect(ConnectRequest {
            player_name: "Pool".to_string(),
        });
        assert!(matches!(
            request(&client, addr, connect).await,
            Message::ConnectResponse(_)
        ));
        client.send_to(b"\x00\x01garbage", addr).await.unwrap();
        assert!(matches!(
            request(&client, addr, Message::Echo("after".to_string())).await,
            Message::Echo(_)
        ));

        let pool = server.buffer_pool().clone();
        assert!(pool.stats().rented >= 3);

        server.stop().await;

        let stats = pool.stats();
        assert_eq!(stats.rented, stats.returned);
    }

    #[tokio::test]
    async fn test_stop_is_prompt_while_idle() {
        let server = Server::start(test_config()).await.unwrap();

        let started = std::time::Instant::now();
        server.stop().await;

        // Loops observe the signal without waiting out the grace period
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_empty_datagram_is_skipped() {
        let server = Server::start(test_config()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        for _ in 0..5 {
            client.send_to(&[], addr).await.unwrap();
        }
        let reply = request(&client, addr, Message::Echo("PING".to_string())).await;
        assert_eq!(reply, Message::Echo("ECHO:PING".to_string()));

        let pool = server.buffer_pool().clone();
        assert!(pool.stats().rented >= 6);

        server.stop().await;

        let stats = pool.stats();
        assert_eq!(stats.rented, stats.returned);
    }

    #[tokio::test]
    async fn test_queued_datagrams_are_dropped_on_shutdown() {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let pool = BufferPool::new(1024, 16);
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_addr = peer.local_addr().unwrap();

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        for i in 0..3 {
            let envelope = Message::Echo(i.to_string()).into_envelope("").unwrap();
            let bytes = encode(&envelope).unwrap();
            let mut buffer = pool.rent(bytes.len());
            buffer[..bytes.len()].copy_from_slice(&bytes);
            let datagram = ReceivedDatagram::new(buffer, bytes.len(), peer_addr).unwrap();
            queue_tx.send(datagram).unwrap();
        }
        assert_eq!(pool.stats().outstanding(), 3);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        dispatch_loop(
            Dispatcher::new(socket, Arc::new(ClientManager::new())),
            queue_rx,
            shutdown_rx,
            Arc::new(AtomicBool::new(true)),
        )
        .await;
        drop(queue_tx);

        assert_eq!(pool.stats().outstanding(), 0);

        let mut buf = [0u8; 1024];
        let reply = timeout(Duration::from_millis(100), peer.recv_from(&mut buf)).await;
        assert!(reply.is_err(), "queued datagram was handled after shutdown");
    }

    #[test]
    fn test_datagram_length_must_fit_buffer() {
        let pool = BufferPool::new(16, 4);
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();

        assert!(ReceivedDatagram::new(pool.rent(16), 17, addr).is_none());
        assert_eq!(pool.stats().outstanding(), 0);

        let datagram = ReceivedDatagram::new(pool.rent(16), 16, addr).unwrap();
        assert_eq!(datagram.bytes().len(), 16);
        assert_eq!(datagram.addr(), addr);
        datagram.release();
        assert_eq!(pool.stats().outstanding(), 0);
    }
}
