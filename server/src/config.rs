use shared::{BUFFER_SIZE, DEFAULT_PORT};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub buffer_size: usize,
    pub max_pooled_buffers: usize,
    /// Pause after a zero-length read before receiving again
    pub empty_read_backoff: Duration,
    /// Pause after a receive error before receiving again
    pub error_backoff: Duration,
    /// How long `stop` waits for the loops before closing the socket
    pub shutdown_grace: Duration,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            buffer_size: BUFFER_SIZE,
            max_pooled_buffers: 256,
            empty_read_backoff: Duration::from_millis(1),
            error_backoff: Duration::from_millis(10),
            shutdown_grace: Duration::from_millis(500),
        }
    }
}
